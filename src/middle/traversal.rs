//! CFG traversal orders

use crate::middle::ir::{BasicBlock, Body};

/// Blocks reachable from the entry, in reverse postorder.
///
/// Every block appears after all of its predecessors except along back
/// edges, which is the order definitions dominate uses in.
pub fn reverse_postorder(body: &Body) -> Vec<BasicBlock> {
    let mut order = postorder(body);
    order.reverse();
    order
}

/// Blocks reachable from the entry, in postorder
pub fn postorder(body: &Body) -> Vec<BasicBlock> {
    let block_count = body.basic_blocks.len();
    if block_count == 0 {
        return Vec::new();
    }

    let mut visited = vec![false; block_count];
    let mut order = Vec::with_capacity(block_count);
    // (block, successors still to visit)
    let mut stack: Vec<(BasicBlock, Vec<BasicBlock>)> = Vec::new();

    visited[0] = true;
    stack.push((BasicBlock::START, successors_rev(body, BasicBlock::START)));

    while let Some((block, pending)) = stack.last_mut() {
        match pending.pop() {
            Some(succ) => {
                if !visited[succ.index()] {
                    visited[succ.index()] = true;
                    let next = successors_rev(body, succ);
                    stack.push((succ, next));
                }
            }
            None => {
                order.push(*block);
                stack.pop();
            }
        }
    }

    order
}

fn successors_rev(
    body: &Body,
    block: BasicBlock,
) -> Vec<BasicBlock> {
    let mut succs = body.block(block).terminator.successors();
    succs.reverse();
    succs
}
