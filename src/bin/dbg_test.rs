use opsched::{ConcurrencyHint, ExecutionContext, LabReactor, Operation, Scheduler};
use std::sync::Arc;

fn main() {
    let context = Arc::new(ExecutionContext::new());
    let lab = Arc::new(LabReactor::new());
    context.register_reactor(lab.clone());
    let sched = Arc::new(Scheduler::new(context, ConcurrencyHint::single_threaded()));
    sched.init_task();
    println!("after init_task outstanding={}", sched.outstanding_work());
    let op = Operation::new(|_, _| { println!("handler ran"); });
    sched.post_immediate_completion(op, false);
    println!("after post outstanding={}", sched.outstanding_work());
    let n = sched.run();
    println!("run returned {}", n);
    println!("stopped={}", sched.stopped());
}
