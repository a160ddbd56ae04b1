//! Model-based properties for the operation queue: an arbitrary sequence of
//! push/pop/stage/splice commands must agree with a `VecDeque` model.

use opsched::{OpQueue, Operation};
use proptest::prelude::*;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
enum Cmd {
    /// Push a fresh tagged op onto the main queue.
    Push,
    /// Pop from the main queue and check the tag.
    Pop,
    /// Push a fresh tagged op onto the staging queue.
    Stage,
    /// Splice the staging queue onto the main queue.
    Splice,
}

fn cmd_strategy() -> impl Strategy<Value = Cmd> {
    prop_oneof![
        Just(Cmd::Push),
        Just(Cmd::Pop),
        Just(Cmd::Stage),
        Just(Cmd::Splice),
    ]
}

fn tagged(tag: usize) -> Box<Operation> {
    let mut op = Operation::new(|_, _| {});
    op.set_result(Ok(tag));
    op
}

fn tag_of(op: &Operation) -> usize {
    *op.result().as_ref().expect("model ops carry Ok tags")
}

proptest! {
    #[test]
    fn queue_agrees_with_vecdeque_model(cmds in prop::collection::vec(cmd_strategy(), 0..128)) {
        let mut queue = OpQueue::new();
        let mut staged = OpQueue::new();
        let mut model: VecDeque<usize> = VecDeque::new();
        let mut staged_model: VecDeque<usize> = VecDeque::new();
        let mut next_tag = 0usize;

        for cmd in cmds {
            match cmd {
                Cmd::Push => {
                    queue.push(tagged(next_tag));
                    model.push_back(next_tag);
                    next_tag += 1;
                }
                Cmd::Stage => {
                    staged.push(tagged(next_tag));
                    staged_model.push_back(next_tag);
                    next_tag += 1;
                }
                Cmd::Pop => {
                    let popped = queue.pop().map(|op| tag_of(&op));
                    prop_assert_eq!(popped, model.pop_front());
                }
                Cmd::Splice => {
                    queue.splice(&mut staged);
                    model.extend(staged_model.drain(..));
                    prop_assert!(staged.is_empty());
                    prop_assert_eq!(staged.len(), 0);
                }
            }
            prop_assert_eq!(queue.len(), model.len());
            prop_assert_eq!(queue.is_empty(), model.is_empty());
            prop_assert_eq!(queue.front().map(tag_of), model.front().copied());
        }

        // Drain and compare the tail end.
        while let Some(expected) = model.pop_front() {
            let popped = queue.pop().map(|op| tag_of(&op));
            prop_assert_eq!(popped, Some(expected));
        }
        prop_assert!(queue.pop().is_none());
    }
}
