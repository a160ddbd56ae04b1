use opsched::{ConcurrencyHint, ExecutionContext, LabReactor, Operation, Scheduler, Error};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Tracked {
    completed: Arc<AtomicUsize>,
    invoked: bool,
    id: usize,
}
static NEXT_ID: AtomicUsize = AtomicUsize::new(0);
impl Tracked {
    fn new(completed: Arc<AtomicUsize>) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
        eprintln!("Tracked::new id={} addr={:p}", id, &completed);
        Self { completed, invoked: false, id }
    }
}
impl Drop for Tracked {
    fn drop(&mut self) {
        eprintln!("Tracked::drop id={} invoked={} selfaddr={:p}", self.id, self.invoked, self as *const _);
        if self.invoked {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn main() {
    let context = Arc::new(ExecutionContext::new());
    let lab = Arc::new(LabReactor::new());
    context.register_reactor(lab.clone());
    let sched = Arc::new(Scheduler::new(context, ConcurrencyHint::single_threaded()));
    sched.init_task();
    println!("after init_task outstanding={}", sched.outstanding_work());

    let completed = Arc::new(AtomicUsize::new(0));
    let mut tracked = Tracked::new(completed.clone());
    eprintln!("tracked addr before move={:p}", &tracked as *const _);
    let op = Operation::new(move |_: &Scheduler, _: Result<usize, Error>| {
        eprintln!("closure invoked! tracked addr in closure={:p}", &tracked as *const _);
        tracked.invoked = true;
    });
    sched.post_immediate_completion(op, false);
    println!("after post outstanding={}", sched.outstanding_work());
    let n = sched.run();
    println!("run returned {}", n);
    println!("completed={}", completed.load(Ordering::SeqCst));
    println!("stopped={}", sched.stopped());
}
