//! Death tests: the fatal paths take the whole process down with them, so
//! each scenario re-executes this test binary as a child filtered to a single
//! test, with an environment marker selecting the lethal branch.

use std::env;
use std::process::{Command, ExitStatus};
use std::ptr::NonNull;

use lumen_core::{ForeignHandle, Object};

fn run_lethal_child(test_name: &str, marker: &str) -> ExitStatus {
    Command::new(env::current_exe().unwrap())
        .args([test_name, "--exact", "--nocapture", "--test-threads=1"])
        .env(marker, "1")
        .status()
        .unwrap()
}

// A panicking child would be caught by its own test harness and reported as a
// mere test failure; the contract is a process abort, so on unix the child
// must have died of SIGABRT specifically.
fn assert_aborted(status: ExitStatus) {
    assert!(!status.success());
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(libc::SIGABRT));
    }
}

#[test]
fn underflow_aborts_the_process() {
    if env::var_os("LUMEN_DIE_UNDERFLOW").is_some() {
        let obj = Object::new();
        obj.dec_ref(true);
        unreachable!("underflow must abort");
    }
    assert_aborted(run_lethal_child(
        "underflow_aborts_the_process",
        "LUMEN_DIE_UNDERFLOW",
    ));
}

#[test]
fn double_handoff_aborts_the_process() {
    if env::var_os("LUMEN_DIE_HANDOFF").is_some() {
        let slot: &'static mut u64 = Box::leak(Box::new(0));
        let handle = ForeignHandle::new(NonNull::from(slot).cast());
        let obj = Object::new();
        obj.set_foreign_owner(handle);
        obj.set_foreign_owner(handle);
        unreachable!("second handoff must abort");
    }
    assert_aborted(run_lethal_child(
        "double_handoff_aborts_the_process",
        "LUMEN_DIE_HANDOFF",
    ));
}
