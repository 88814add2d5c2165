//! Span 单元测试

use crate::util::span::{Position, Span};

#[test]
fn test_position_display() {
    let pos = Position::new(10, 20);
    assert_eq!(format!("{}", pos), "10:20");
}

#[test]
fn test_dummy_span_display() {
    assert!(Span::dummy().is_dummy());
    assert_eq!(format!("{}", Span::dummy()), "<unknown>");
}

#[test]
fn test_span_to_covers_both() {
    let a = Span::line(3, 5, 9);
    let b = Span::line(4, 1, 2);
    let joined = a.to(b);
    assert_eq!(joined.start, Position::new(3, 5));
    assert_eq!(joined.end, Position::new(4, 2));
}

#[test]
fn test_span_to_ignores_dummy() {
    let a = Span::line(1, 1, 4);
    assert_eq!(a.to(Span::dummy()), a);
    assert_eq!(Span::dummy().to(a), a);
}
