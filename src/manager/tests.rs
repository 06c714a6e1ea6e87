//! Tests for the manager facade.

use super::*;
use crate::error::JointError;
use std::io::{Read, Write};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn millis(ms: i64) -> Timeout {
    Timeout::from_millis(ms)
}

fn read_to_string(mgr: &JoinableFileManager, ctx: &OwnerContext, path: &Path) -> String {
    let mut input = mgr.open_input_stream(ctx, path).unwrap().unwrap();
    let mut out = String::new();
    input.read_to_string(&mut out).unwrap();
    input.close().unwrap();
    out
}

fn lock_dir_then_write_children(children: usize, timeout: Timeout) {
    let temp_dir = TempDir::new().unwrap();
    let mgr = JoinableFileManager::new();
    let ctx = OwnerContext::new();
    let dir = temp_dir.path().join("dir");

    assert!(mgr.lock(&ctx, &dir, timeout, LockLevel::Write, None).unwrap());
    assert!(mgr.is_write_locked(&dir));

    let mut handles = Vec::new();
    for i in 0..children {
        let child = dir.join(format!("child{i}.txt"));
        assert!(mgr.is_write_locked(&child));
        let out = mgr
            .open_output_stream_with_timeout(&ctx, &child, timeout)
            .unwrap()
            .expect("owner of the directory lock opens children without blocking");
        handles.push((child, out));
    }

    for (_, out) in handles.iter_mut() {
        out.write_all(b"This is a test").unwrap();
    }
    for (child, mut out) in handles {
        out.close().unwrap();
        assert!(mgr.is_write_locked(&dir));
        // Still covered by the directory lock.
        assert!(mgr.is_write_locked(&child));
    }

    assert!(mgr.unlock(&ctx, &dir).unwrap());
    assert!(!mgr.is_write_locked(&dir));
    for i in 0..children {
        let child = dir.join(format!("child{i}.txt"));
        assert!(!mgr.is_write_locked(&child));
        assert_eq!(std::fs::read_to_string(&child).unwrap(), "This is a test");
    }
    assert!(mgr.registry().is_empty());
}

#[test]
fn test_lock_dir_then_one_child() {
    lock_dir_then_write_children(1, millis(2000));
}

#[test]
fn test_lock_dir_then_two_children() {
    lock_dir_then_write_children(2, millis(2000));
}

#[test]
fn test_lock_dir_then_four_children() {
    lock_dir_then_write_children(4, millis(2000));
}

#[test]
fn test_lock_dir_then_two_children_forever() {
    lock_dir_then_write_children(2, millis(i64::MAX));
}

#[test]
fn test_lock_dir_then_four_children_forever() {
    lock_dir_then_write_children(4, millis(i64::MAX));
}

#[test]
fn test_directory_lock_blocks_other_owners_below_it() {
    let temp_dir = TempDir::new().unwrap();
    let mgr = JoinableFileManager::new();
    let a = OwnerContext::with_label("a");
    let b = OwnerContext::with_label("b");
    let dir = temp_dir.path().join("dir");
    let child = dir.join("nested").join("f.txt");

    assert!(mgr.lock(&a, &dir, millis(0), LockLevel::Write, None).unwrap());
    assert!(mgr.is_write_locked(&child));
    assert!(mgr.is_locked_by_current_context(&a, &child));
    assert!(!mgr.is_locked_by_current_context(&b, &child));

    assert!(!mgr.lock(&b, &child, millis(20), LockLevel::Write, None).unwrap());
    assert!(
        mgr.open_output_stream_with_timeout(&b, &child, millis(20))
            .unwrap()
            .is_none()
    );
    assert!(mgr.lock(&a, &child, millis(0), LockLevel::Write, None).unwrap());

    assert!(mgr.unlock(&a, &child).unwrap());
    assert!(mgr.unlock(&a, &dir).unwrap());
    assert!(mgr.registry().is_empty());
}

#[test]
fn test_timeboxed_second_writer() {
    let temp_dir = TempDir::new().unwrap();
    let mgr = JoinableFileManager::new();
    let ctx = OwnerContext::new();
    let path = temp_dir.path().join("f.txt");

    ctx.set_label("owner a");
    let mut first = mgr
        .open_output_stream_with_timeout(&ctx, &path, millis(100))
        .unwrap()
        .unwrap();

    ctx.set_label("owner b");
    assert!(
        mgr.open_output_stream_with_timeout(&ctx, &path, millis(100))
            .unwrap()
            .is_none()
    );

    ctx.set_label("owner a");
    first.close().unwrap();

    ctx.set_label("owner c");
    let third = mgr
        .open_output_stream_with_timeout(&ctx, &path, millis(100))
        .unwrap();
    assert!(third.is_some());
    drop(third);
    assert!(mgr.registry().is_empty());
}

#[test]
fn test_waiting_writer_gets_the_path_on_release() {
    let temp_dir = TempDir::new().unwrap();
    let mgr = JoinableFileManager::new();
    let path = temp_dir.path().join("f.txt");

    let ctx = OwnerContext::new();
    let first = mgr.open_output_stream(&ctx, &path).unwrap().unwrap();

    let waiter = {
        let mgr = mgr.clone();
        let path = path.clone();
        thread::spawn(move || {
            let ctx = OwnerContext::new();
            let mut out = mgr
                .open_output_stream_with_timeout(&ctx, &path, millis(5000))
                .unwrap()
                .unwrap();
            out.write_all(b"second").unwrap();
        })
    };

    thread::sleep(Duration::from_millis(50));
    drop(first);
    waiter.join().unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    assert!(mgr.registry().is_empty());
}

#[test]
fn test_concurrent_write_and_read() {
    let temp_dir = TempDir::new().unwrap();
    let mgr = JoinableFileManager::new();
    let path = temp_dir.path().join("f.txt");
    let started = Arc::new(Barrier::new(2));
    let joined = Arc::new(Barrier::new(2));

    let writer = {
        let mgr = mgr.clone();
        let path = path.clone();
        let started = started.clone();
        let joined = joined.clone();
        thread::spawn(move || {
            let ctx = OwnerContext::with_label("writer");
            let mut out = mgr.open_output_stream(&ctx, &path).unwrap().unwrap();
            out.write_all(b"This ").unwrap();
            started.wait();
            joined.wait();
            out.write_all(b"is a ").unwrap();
            out.write_all(b"test").unwrap();
            out.close().unwrap();
            mgr.cleanup_current_context(&ctx).unwrap();
        })
    };

    let reader = {
        let mgr = mgr.clone();
        let path = path.clone();
        thread::spawn(move || {
            let ctx = OwnerContext::with_label("reader");
            started.wait();
            let mut input = mgr.open_input_stream(&ctx, &path).unwrap().unwrap();
            joined.wait();
            assert!(input.is_joined());
            let mut out = String::new();
            input.read_to_string(&mut out).unwrap();
            input.close().unwrap();
            mgr.cleanup_current_context(&ctx).unwrap();
            out
        })
    };

    writer.join().unwrap();
    assert_eq!(reader.join().unwrap(), "This is a test");
    assert!(!mgr.registry().contains(&path));
    assert!(mgr.registry().is_empty());
}

#[test]
fn test_concurrent_readers_of_static_file() {
    let temp_dir = TempDir::new().unwrap();
    let mgr = JoinableFileManager::new();
    let path = temp_dir.path().join("f.txt");
    std::fs::write(&path, "This is a test").unwrap();

    let readers = 4;
    let barrier = Arc::new(Barrier::new(readers));
    let threads: Vec<_> = (0..readers)
        .map(|_| {
            let mgr = mgr.clone();
            let path = path.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let ctx = OwnerContext::new();
                let mut input = mgr.open_input_stream(&ctx, &path).unwrap().unwrap();
                barrier.wait();
                let mut out = String::new();
                input.read_to_string(&mut out).unwrap();
                out
            })
        })
        .collect();

    for t in threads {
        assert_eq!(t.join().unwrap(), "This is a test");
    }

    let mut live = 0;
    mgr.registry().for_all(|_| true, |_| live += 1);
    assert_eq!(live, 0);
}

#[test]
fn test_two_readers_entry_removed_on_last_close() {
    let temp_dir = TempDir::new().unwrap();
    let mgr = JoinableFileManager::new();
    let path = temp_dir.path().join("f.txt");
    std::fs::write(&path, "abc").unwrap();

    let a = OwnerContext::with_label("a");
    let b = OwnerContext::with_label("b");
    let mut first = mgr.open_input_stream(&a, &path).unwrap().unwrap();
    let mut second = mgr.open_input_stream(&b, &path).unwrap().unwrap();

    first.close().unwrap();
    assert!(mgr.registry().contains(&path));
    second.close().unwrap();
    assert!(mgr.registry().is_empty());
}

#[test]
fn test_write_lock_does_not_block_input_stream() {
    let temp_dir = TempDir::new().unwrap();
    let mgr = JoinableFileManager::new();
    let path = temp_dir.path().join("f.txt");
    std::fs::write(&path, "content").unwrap();

    let a = OwnerContext::with_label("a");
    let b = OwnerContext::with_label("b");
    assert!(mgr.lock(&a, &path, millis(0), LockLevel::Write, None).unwrap());
    assert_eq!(read_to_string(&mgr, &b, &path), "content");

    assert!(mgr.unlock(&a, &path).unwrap());
    assert!(mgr.registry().is_empty());
}

#[test]
fn test_wait_for_write_unlock_then_open_output_stream() {
    let temp_dir = TempDir::new().unwrap();
    let mgr = JoinableFileManager::new();
    let path = temp_dir.path().join("f.txt");

    let a = OwnerContext::with_label("a");
    assert!(mgr.lock(&a, &path, millis(0), LockLevel::Write, None).unwrap());

    let waiter = {
        let mgr = mgr.clone();
        let path = path.clone();
        thread::spawn(move || {
            let b = OwnerContext::with_label("b");
            assert!(mgr.wait_for_write_unlock(&b, &path, millis(5000)).unwrap());
            let mut out = mgr.open_output_stream(&b, &path).unwrap().unwrap();
            out.write_all(b"after unlock").unwrap();
        })
    };

    thread::sleep(Duration::from_millis(30));
    assert!(mgr.unlock(&a, &path).unwrap());
    waiter.join().unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "after unlock");
}

#[test]
fn test_wait_for_unlock_times_out() {
    let temp_dir = TempDir::new().unwrap();
    let mgr = JoinableFileManager::new();
    let path = temp_dir.path().join("f.txt");
    let a = OwnerContext::with_label("a");
    let b = OwnerContext::with_label("b");

    assert!(mgr.lock(&a, &path, millis(0), LockLevel::Read, None).unwrap());
    assert!(!mgr.wait_for_read_unlock(&b, &path, millis(20)).unwrap());
    assert!(mgr.wait_for_write_unlock(&b, &path, millis(20)).unwrap());
    // Own locks never block the caller.
    assert!(mgr.wait_for_read_unlock(&a, &path, millis(0)).unwrap());
    mgr.unlock(&a, &path).unwrap();
}

#[test]
fn test_output_stream_is_write_locked_not_read_locked() {
    let temp_dir = TempDir::new().unwrap();
    let mgr = JoinableFileManager::new();
    let ctx = OwnerContext::new();
    let path = temp_dir.path().join("f.txt");

    let out = mgr.open_output_stream(&ctx, &path).unwrap().unwrap();
    assert!(mgr.is_write_locked(&path));
    assert!(!mgr.is_read_locked(&path));
    assert!(mgr.is_locked_by_current_context(&ctx, &path));

    drop(out);
    assert!(!mgr.is_write_locked(&path));
}

#[test]
fn test_input_stream_is_not_locked() {
    let temp_dir = TempDir::new().unwrap();
    let mgr = JoinableFileManager::new();
    let ctx = OwnerContext::new();
    let path = temp_dir.path().join("f.txt");
    std::fs::write(&path, "x").unwrap();

    let input = mgr.open_input_stream(&ctx, &path).unwrap().unwrap();
    assert!(!mgr.is_write_locked(&path));
    assert!(!mgr.is_read_locked(&path));
    assert!(mgr.registry().contains(&path));
    drop(input);
    assert!(mgr.registry().is_empty());
}

#[test]
fn test_cleanup_then_open_output_stream() {
    let temp_dir = TempDir::new().unwrap();
    let mgr = JoinableFileManager::new();
    let ctx = OwnerContext::with_label("job 1");
    let dir = temp_dir.path().join("dir");
    let path = dir.join("f.txt");

    assert!(mgr.lock(&ctx, &dir, millis(0), LockLevel::Write, None).unwrap());
    assert!(mgr.lock(&ctx, &dir, millis(0), LockLevel::Write, None).unwrap());
    let mut out = mgr.open_output_stream(&ctx, &path).unwrap().unwrap();
    out.write_all(b"abandoned").unwrap();

    assert_eq!(mgr.cleanup_current_context(&ctx).unwrap(), 2);
    assert_eq!(ctx.label(), None);
    assert!(!mgr.is_write_locked(&dir));
    assert!(mgr.registry().is_empty());

    // The pooled context is reusable by an unrelated job.
    ctx.set_label("job 2");
    let mut next = mgr.open_output_stream(&ctx, &path).unwrap().unwrap();
    next.write_all(b"fresh").unwrap();
    next.close().unwrap();

    // The detached handle is inert.
    assert!(out.write_all(b"late").is_err());
    drop(out);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "fresh");
    assert!(mgr.registry().is_empty());
}

#[test]
fn test_reentrant_lock_needs_matching_unlocks() {
    let temp_dir = TempDir::new().unwrap();
    let mgr = JoinableFileManager::new();
    let a = OwnerContext::with_label("a");
    let b = OwnerContext::with_label("b");
    let path = temp_dir.path().join("f.txt");

    assert!(mgr.lock(&a, &path, millis(0), LockLevel::Write, None).unwrap());
    assert!(mgr.lock(&a, &path, millis(0), LockLevel::Write, None).unwrap());

    assert!(mgr.unlock(&a, &path).unwrap());
    assert!(mgr.is_write_locked(&path));
    assert!(!mgr.lock(&b, &path, millis(0), LockLevel::Write, None).unwrap());

    assert!(mgr.unlock(&a, &path).unwrap());
    assert!(!mgr.is_write_locked(&path));
    assert!(!mgr.unlock(&a, &path).unwrap());
    assert!(mgr.registry().is_empty());
}

#[test]
fn test_unlock_by_non_owner_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let mgr = JoinableFileManager::new();
    let a = OwnerContext::with_label("a");
    let b = OwnerContext::with_label("b");
    let path = temp_dir.path().join("f.txt");

    assert!(mgr.lock(&a, &path, millis(0), LockLevel::Write, None).unwrap());
    assert!(!mgr.unlock(&b, &path).unwrap());
    assert!(mgr.is_write_locked(&path));
    assert!(mgr.unlock(&a, &path).unwrap());
}

#[test]
fn test_cleanup_with_nothing_held_is_noop() {
    let mgr = JoinableFileManager::new();
    let ctx = OwnerContext::with_label("idle");
    assert_eq!(mgr.cleanup_current_context(&ctx).unwrap(), 0);
    assert_eq!(mgr.cleanup_current_context(&ctx).unwrap(), 0);
    assert!(mgr.registry().is_empty());
}

#[test]
fn test_paths_are_canonicalized() {
    let temp_dir = TempDir::new().unwrap();
    let mgr = JoinableFileManager::new();
    let ctx = OwnerContext::new();
    let dir = temp_dir.path().join("dir");
    std::fs::create_dir(&dir).unwrap();

    let dotted = dir.join("sub").join("..").join("f.txt");
    assert!(mgr.lock(&ctx, &dotted, millis(0), LockLevel::Write, None).unwrap());
    assert!(mgr.is_write_locked(dir.join("f.txt")));
    assert!(mgr.unlock(&ctx, dir.join("./f.txt")).unwrap());
    assert!(mgr.registry().is_empty());
}

#[test]
fn test_open_input_stream_of_missing_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let mgr = JoinableFileManager::new();
    let ctx = OwnerContext::new();

    let result = mgr.open_input_stream(&ctx, temp_dir.path().join("missing"));
    assert!(matches!(result, Err(JointError::Io { .. })));
    assert!(mgr.registry().is_empty());
}

#[test]
fn test_max_readers_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = ManagerConfig {
        max_readers: Some(1),
        default_timeout_ms: 10,
        ..ManagerConfig::default()
    };
    let mgr = JoinableFileManager::with_config(config);
    let path = temp_dir.path().join("f.txt");
    std::fs::write(&path, "x").unwrap();

    let a = OwnerContext::with_label("a");
    let b = OwnerContext::with_label("b");
    let held = mgr.open_input_stream(&a, &path).unwrap();
    assert!(held.is_some());
    assert!(mgr.open_input_stream(&b, &path).unwrap().is_none());
    drop(held);
    assert!(mgr.open_input_stream(&b, &path).unwrap().is_some());
}
