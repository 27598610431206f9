use parking_lot::Mutex;
use phecs::{Component, Config, Error, JobHandle, World};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Component, Debug, Clone, PartialEq)]
struct Counter(usize);

#[test]
fn dedicated_pool() {
    let config = Config::new()
        .with_worker_threads(2)
        .with_thread_name("phecs-test");
    let world = World::with_config(config).unwrap();
    assert_eq!(world.jobs().worker_count(), 2);

    let name = Arc::new(Mutex::new(None));
    {
        let name = Arc::clone(&name);
        world
            .jobs()
            .schedule(move || {
                *name.lock() = std::thread::current().name().map(String::from);
            })
            .complete()
            .unwrap();
    }

    let name = name.lock().clone().unwrap();
    assert!(name.starts_with("phecs-test-"), "{}", name);
}

#[test]
fn chained_jobs_run_in_order() {
    let world = World::new();
    let jobs = world.jobs();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut handle = JobHandle::completed();
    for step in 0..10 {
        let log = Arc::clone(&log);
        handle = jobs.schedule_after(&handle, move || log.lock().push(step));
    }

    handle.complete().unwrap();
    assert_eq!(*log.lock(), (0..10).collect::<Vec<_>>());
}

#[test]
fn combined_handles() {
    let world = World::new();
    let jobs = world.jobs();
    let done = Arc::new(AtomicUsize::new(0));

    let first: Vec<_> = (0..4)
        .map(|_| {
            let done = Arc::clone(&done);
            jobs.schedule(move || {
                done.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();
    let barrier = JobHandle::combine(first);

    let observed = Arc::new(AtomicUsize::new(0));
    let last = {
        let done = Arc::clone(&done);
        let observed = Arc::clone(&observed);
        jobs.schedule_after(&barrier, move || {
            observed.store(done.load(Ordering::SeqCst), Ordering::SeqCst);
        })
    };

    last.complete().unwrap();
    assert!(barrier.is_completed());
    assert_eq!(observed.load(Ordering::SeqCst), 4);
}

#[test]
fn failure_propagates_through_combine() {
    let world = World::new();
    let jobs = world.jobs();

    let ok = jobs.schedule(|| ());
    let bad = jobs.schedule(|| panic!("lost a chunk"));

    match JobHandle::combine(vec![ok, bad]).complete() {
        Err(Error::JobPanicked(message)) => assert!(message.contains("lost a chunk")),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn chunks_do_not_overlap() {
    let mut world = World::new();
    for _ in 0..37 {
        let entity = world.create_entity();
        world.add(entity, Counter(0)).unwrap();
    }
    let column = world.column::<Counter>().unwrap();

    let slices = Arc::new(Mutex::new(Vec::new()));
    {
        let slices = Arc::clone(&slices);
        world
            .jobs()
            .for_each_chunk(&column, 5, move |entities, values| {
                assert_eq!(entities.len(), values.len());
                slices.lock().push(values.len());
                for value in values {
                    value.0 += 1;
                }
            })
            .complete()
            .unwrap();
    }

    let mut slices = slices.lock().clone();
    slices.sort();
    assert_eq!(slices, vec![5, 8, 8, 8, 8]);
    assert!(column.borrow().values().iter().all(|value| value.0 == 1));
}

#[test]
fn empty_column_is_fine() {
    let mut world = World::new();
    let column = world.column::<Counter>().unwrap();

    world
        .jobs()
        .for_each_chunk(&column, 4, |_, _| panic!("no chunks expected"))
        .complete()
        .unwrap();
}
