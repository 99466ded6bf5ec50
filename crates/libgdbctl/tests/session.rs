use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};

use libgdbctl::command::{self, Command};
use libgdbctl::session::FrameScan;
use libgdbctl::{DebugEvent, GdbCtlResult, GdbLink, Session, SessionState, TargetConfig};

#[derive(Debug, Default)]
struct Recorder {
    sent: Vec<String>,
    interrupts: usize,
}

impl GdbLink for Recorder {
    fn send_line(&mut self, line: &str) -> GdbCtlResult<()> {
        self.sent.push(line.to_string());
        Ok(())
    }

    fn interrupt(&mut self) -> GdbCtlResult<()> {
        self.interrupts += 1;
        Ok(())
    }
}

const WORK_DIR: &str = "/nonexistent-proj";
const EXE: &str = "/nonexistent-proj/build/app";

/// Source files resolve next to the executable since the work dir does not exist.
fn src(name: &str) -> PathBuf {
    Path::new("/nonexistent-proj/build").join(name)
}

struct Harness {
    session: Session<Recorder>,
    events: Receiver<DebugEvent>,
}

impl Harness {
    fn new() -> Self {
        let (tx, events) = mpsc::channel();
        let mut session = Session::new(tx);
        session
            .start(TargetConfig::new(EXE, WORK_DIR), |_| Ok(Recorder::default()))
            .unwrap();
        Self { session, events }
    }

    /// Start and walk through the setup commands up to the first idle prompt.
    fn booted() -> Self {
        let mut h = Self::new();
        for _ in 0..5 {
            h.prompt();
        }
        h.stdout("No breakpoints or watchpoints.\n");
        h.prompt();
        assert_eq!(h.session.state(), SessionState::Ready);
        h.events();
        h.clear_sent();
        h
    }

    fn stdout(&mut self, text: &str) {
        self.session.on_stdout(text.as_bytes());
        self.session.run_tasks().unwrap();
    }

    fn stderr(&mut self, text: &str) {
        self.session.on_stderr(text.as_bytes());
        self.session.run_tasks().unwrap();
    }

    fn prompt(&mut self) {
        self.stdout("(gdb) ");
    }

    fn events(&self) -> Vec<DebugEvent> {
        self.events.try_iter().collect()
    }

    fn sent(&self) -> Vec<String> {
        self.session.link().unwrap().sent.clone()
    }

    fn last_sent(&self) -> Option<String> {
        self.sent().last().cloned()
    }

    fn clear_sent(&mut self) {
        self.session.link_mut().unwrap().sent.clear();
    }

    fn queued(&self) -> Vec<String> {
        self.session.queued().map(|c| c.text().to_string()).collect()
    }
}

fn texts(commands: Vec<Command>) -> Vec<String> {
    commands.iter().map(|c| c.text().to_string()).collect()
}

#[test]
fn startup_issues_setup_sequence() {
    let mut h = Harness::new();
    assert!(h.sent().is_empty());
    assert_eq!(h.session.state(), SessionState::Ready);

    for _ in 0..5 {
        h.prompt();
    }
    assert_eq!(
        h.sent(),
        vec![
            "set pagination off",
            "file /nonexistent-proj/build/app",
            "set args  ",
            "set inferior-tty /dev/null",
            "info breakpoints",
        ]
    );
    assert!(h.session.last_command().unwrap().is_quiet());

    h.events();
    h.stdout("Num     Type           Disp Enb Address            What\n");
    h.stdout("1       breakpoint     keep y   0x0000000000401136 in main at main.c:7\n");
    h.prompt();

    let events = h.events();
    assert_eq!(
        events,
        vec![
            DebugEvent::ClearBreakpointMarks,
            DebugEvent::BreakpointSet {
                file: src("main.c"),
                line: 6
            },
            DebugEvent::ReadyForInput(true),
        ]
    );
    assert!(h.session.has_breakpoint(&src("main.c"), 7));
}

#[test]
fn transcript_echoes_loud_commands() {
    let mut h = Harness::new();
    h.prompt();
    let events = h.events();
    assert_eq!(
        events,
        vec![
            DebugEvent::ReadyForInput(false),
            DebugEvent::OutputText("(gdb) set pagination off".into()),
        ]
    );
}

#[test]
fn breakpoint_toggle_round_trip() {
    let mut h = Harness::booted();
    let main_c = src("main.c");

    h.session.toggle_breakpoint(&main_c, 10).unwrap();
    assert_eq!(h.last_sent().unwrap(), "break /nonexistent-proj/build/main.c:10");

    h.stdout("Breakpoint 1 at 0x4005f6: file main.c, line 10.\n");
    let events = h.events();
    assert!(events.contains(&DebugEvent::BreakpointSet {
        file: main_c.clone(),
        line: 9
    }));
    let ids: Vec<u32> = h.session.breakpoints().map(|b| b.id).collect();
    assert_eq!(ids, vec![1]);
    h.prompt();

    h.session.toggle_breakpoint(&main_c, 10).unwrap();
    assert_eq!(h.last_sent().unwrap(), "clear /nonexistent-proj/build/main.c:10");

    h.stdout("Deleted breakpoint 1 \n");
    let cleared: Vec<DebugEvent> = h
        .events()
        .into_iter()
        .filter(|e| matches!(e, DebugEvent::BreakpointCleared { .. }))
        .collect();
    assert_eq!(
        cleared,
        vec![DebugEvent::BreakpointCleared {
            file: main_c.clone(),
            line: 9
        }]
    );
    assert_eq!(h.session.breakpoints().count(), 0);
    h.prompt();
    assert!(!h.session.has_breakpoint(&main_c, 10));
}

#[test]
fn requests_while_busy_are_dropped() {
    let mut h = Harness::booted();
    h.session.continue_execution().unwrap();
    assert!(h.session.is_busy());

    h.session.toggle_breakpoint(&src("main.c"), 3).unwrap();
    h.session.move_pc(&src("main.c"), 3).unwrap();
    h.session.run_to_cursor(&src("main.c"), 3).unwrap();
    h.session.step_over().unwrap();

    assert_eq!(h.sent(), vec!["continue"]);
    assert!(h.queued().is_empty());
}

#[test]
fn not_running_after_continue_restarts_and_continues() {
    let mut h = Harness::booted();
    h.session.continue_execution().unwrap();

    h.stderr("The program is not being run.\n");
    assert_eq!(h.queued(), texts(command::restart_and_continue()));
    assert!(h.events().contains(&DebugEvent::OutputError(
        "The program is not being run.".into()
    )));

    h.prompt();
    assert_eq!(h.last_sent().unwrap(), "tbreak main");
}

#[test]
fn not_running_after_step_restarts_to_entry() {
    let mut h = Harness::booted();
    h.session.step_into().unwrap();
    h.stderr("The program is not being run.\n");
    assert_eq!(h.queued(), texts(command::restart_to_entry()));
}

#[test]
fn not_running_after_kill_quits() {
    let mut h = Harness::booted();
    h.session.kill().unwrap();
    assert_eq!(h.last_sent().unwrap(), "kill");

    h.stderr("The program is not being run.\n");
    assert_eq!(h.last_sent().unwrap(), "quit");
}

#[test]
fn not_running_after_kill_keeps_restart() {
    let mut h = Harness::booted();
    h.session.rerun().unwrap();
    assert_eq!(h.last_sent().unwrap(), "kill");

    h.stderr("The program is not being run.\n");
    assert_eq!(h.last_sent().unwrap(), "file /nonexistent-proj/build/app");
    assert_eq!(h.queued().last().unwrap(), "continue");
}

#[test]
fn prompt_waits_for_pending_errors() {
    let mut h = Harness::booted();
    h.session.continue_execution().unwrap();

    // Both channels deliver before the loop gets to run deferred work.
    h.session.on_stdout(b"(gdb) ");
    h.session.on_stderr(b"The program is not being run.\n");
    h.session.run_tasks().unwrap();

    assert_eq!(h.last_sent().unwrap(), "tbreak main");
    assert!(!h.events().contains(&DebugEvent::ReadyForInput(true)));
}

#[test]
fn stop_triggers_introspection_bundle() {
    let mut h = Harness::booted();
    h.session.step_over().unwrap();
    h.events();
    h.clear_sent();

    h.stdout("main () at main.c:12\n12\t  x++;\n(gdb) ");
    let events = h.events();
    assert!(events.contains(&DebugEvent::LocationChanged {
        file: src("main.c"),
        line: 11
    }));
    assert!(!events.contains(&DebugEvent::ReadyForInput(true)));
    assert_eq!(h.sent(), vec!["info stack"]);

    h.stdout("#0  main () at main.c:12\n(gdb) ");
    h.stdout("#0  main () at main.c:12\n12\t  x++;\n(gdb) ");
    h.stdout("argc = 1\n(gdb) ");
    h.stdout("x = 3\n(gdb) ");
    h.stdout("* 1    Thread 0x7ffff7d8a740 (LWP 42) \"app\" main () at main.c:12\n(gdb) ");

    assert_eq!(
        h.sent(),
        vec!["info stack", "frame", "info args", "info locals", "info thread"]
    );

    let events = h.events();
    assert!(!events.iter().any(|e| matches!(e, DebugEvent::OutputText(_))));
    let expected = [
        DebugEvent::StackFrameInfo {
            level: "0".into(),
            description: " main () at main.c:12".into(),
        },
        DebugEvent::stack_frame_end(),
        DebugEvent::StackFrameChanged(0),
        DebugEvent::InfoLocal("argc = 1".into()),
        DebugEvent::InfoLocal("x = 3".into()),
        DebugEvent::InfoLocal(String::new()),
        DebugEvent::ThreadInfo {
            id: 1,
            current: true,
        },
        DebugEvent::threads_end(),
    ];
    for event in &expected {
        assert!(events.contains(event), "missing {event:?}");
    }
    assert_eq!(events.last(), Some(&DebugEvent::ReadyForInput(true)));
    assert_eq!(h.session.state(), SessionState::Ready);
}

#[test]
fn thread_switch_triggers_introspection_bundle() {
    let mut h = Harness::booted();
    assert!(!h.session.location_changed());
    h.session.issue_command("thread 2").unwrap();
    h.events();

    h.stdout("[Switching to thread 2 (Thread 0x7ffff7589640 (LWP 43))]\n(gdb) ");
    assert_eq!(h.last_sent().unwrap(), "info stack");
    assert_eq!(
        h.queued(),
        vec!["frame", "info args", "info locals", "info thread"]
    );
    assert!(!h.events().contains(&DebugEvent::ReadyForInput(true)));
}

#[test]
fn backtrace_does_not_select_a_frame() {
    let mut h = Harness::booted();
    h.session.issue_command("bt").unwrap();
    h.stdout("#0  leaf () at util.c:4\n");
    assert_eq!(h.session.frame_scan(), FrameScan::FrameSeen);
    h.stdout("#1  0x0000000000401176 in main () at main.c:20\n");
    assert_eq!(h.session.frame_scan(), FrameScan::TraceSeen);
    h.stdout("(gdb) ");

    assert!(
        !h.events()
            .iter()
            .any(|e| matches!(e, DebugEvent::StackFrameChanged(_)))
    );
}

#[test]
fn loud_info_stack_reports_frames() {
    let mut h = Harness::booted();
    h.session.issue_command("info stack").unwrap();
    assert_eq!(h.session.state(), SessionState::ExecutingCommand);
    h.stdout("#0  leaf () at util.c:4\n");

    let events = h.events();
    assert!(events.contains(&DebugEvent::StackFrameInfo {
        level: "0".into(),
        description: " leaf () at util.c:4".into(),
    }));
    assert!(events.contains(&DebugEvent::OutputText("#0  leaf () at util.c:4".into())));
    assert_eq!(h.session.frame_scan(), FrameScan::Normal);
}

#[test]
fn location_suppressed_while_continue_queued() {
    let mut h = Harness::booted();
    h.session.run_to_cursor(&src("main.c"), 20).unwrap();
    assert_eq!(h.last_sent().unwrap(), "tbreak /nonexistent-proj/build/main.c:20");
    assert_eq!(h.queued(), vec!["continue"]);
    h.events();

    h.stdout("Breakpoint 1, main () at main.c:5\n");
    assert!(
        !h.events()
            .iter()
            .any(|e| matches!(e, DebugEvent::LocationChanged { .. }))
    );
    assert!(h.session.location_changed());

    h.prompt();
    assert_eq!(h.last_sent().unwrap(), "continue");
}

#[test]
fn move_pc_jumps_after_temporary_breakpoint() {
    let mut h = Harness::booted();
    h.session.move_pc(&src("main.c"), 8).unwrap();
    assert_eq!(h.last_sent().unwrap(), "tbreak /nonexistent-proj/build/main.c:8");
    h.stdout("Temporary breakpoint 2 at 0x401150: file main.c, line 8.\n(gdb) ");
    assert_eq!(h.last_sent().unwrap(), "jump /nonexistent-proj/build/main.c:8");
}

#[test]
fn bad_breakpoint_location_aborts_queue() {
    let mut h = Harness::booted();
    h.session.move_pc(Path::new("/x/nowhere.c"), 8).unwrap();
    h.stderr("No source file named /x/nowhere.c.\n");

    assert!(h.queued().is_empty());
    let events = h.events();
    assert!(events.contains(&DebugEvent::ReadyForInput(true)));
    assert!(events.contains(&DebugEvent::OutputError(
        "No source file named /x/nowhere.c.".into()
    )));
}

#[test]
fn missing_line_aborts_queue() {
    let mut h = Harness::booted();
    h.session.run_to_cursor(&src("main.c"), 900).unwrap();
    assert_eq!(h.queued(), vec!["continue"]);
    h.stderr("No line 900 in file \"/nonexistent-proj/build/main.c\".\n");

    assert!(h.queued().is_empty());
    let events = h.events();
    assert!(events.contains(&DebugEvent::ReadyForInput(true)));
    assert!(events.contains(&DebugEvent::OutputError(
        "No line 900 in file \"/nonexistent-proj/build/main.c\".".into()
    )));
}

#[test]
fn error_lines_keep_prompt_like_text() {
    let mut h = Harness::booted();
    h.stderr(">");
    assert!(h.events().is_empty());
    h.stderr(" oops\n");
    assert_eq!(h.events(), vec![DebugEvent::OutputError("> oops".into())]);
}

#[test]
fn no_stack_ends_program() {
    let mut h = Harness::booted();
    h.session.issue_command("finish").unwrap();
    h.stderr("No stack.\n");
    let events = h.events();
    assert!(events.contains(&DebugEvent::ProgramEnded));
    assert!(events.contains(&DebugEvent::OutputError("No stack.".into())));
}

#[test]
fn unknown_error_changes_nothing() {
    let mut h = Harness::booted();
    h.session.step_over().unwrap();
    h.stderr("warning: Error disabling address space randomization: Operation not permitted\n");
    assert_eq!(h.session.state(), SessionState::ExecutingCommand);
    assert_eq!(
        h.events().last(),
        Some(&DebugEvent::OutputError(
            "warning: Error disabling address space randomization: Operation not permitted".into()
        ))
    );
}

#[test]
fn program_exit_drops_queue() {
    let mut h = Harness::booted();
    h.session.run_to_cursor(&src("main.c"), 20).unwrap();
    h.stdout("[Inferior 1 (process 4242) exited normally]\n");

    assert!(h.queued().is_empty());
    assert!(!h.session.location_changed());
    assert!(h.events().contains(&DebugEvent::ProgramEnded));
}

#[test]
fn program_exit_during_restart_keeps_queue() {
    let mut h = Harness::booted();
    h.session.rerun().unwrap();
    assert_eq!(h.last_sent().unwrap(), "kill");
    let restart = h.queued();
    assert_eq!(restart[0], "file /nonexistent-proj/build/app");

    h.stdout("Kill the program being debugged? (y or n) [answered Y; input not from terminal]\n");
    assert_eq!(h.queued(), restart);
    assert!(h.events().contains(&DebugEvent::ProgramEnded));

    h.prompt();
    assert_eq!(h.last_sent().unwrap(), "file /nonexistent-proj/build/app");
}

#[test]
fn interrupt_keeps_queue() {
    let mut h = Harness::booted();
    h.session.run_to_cursor(&src("main.c"), 20).unwrap();
    h.session.interrupt().unwrap();

    assert_eq!(h.session.link().unwrap().interrupts, 1);
    assert_eq!(h.queued(), vec!["continue"]);
    assert!(h.session.location_changed());
}

#[test]
fn kill_while_busy_interrupts_first() {
    let mut h = Harness::booted();
    h.session.continue_execution().unwrap();
    h.session.kill().unwrap();

    assert_eq!(h.session.link().unwrap().interrupts, 1);
    assert_eq!(h.sent(), vec!["continue", "kill"]);
}

#[test]
fn teardown_clears_breakpoints_in_order() {
    let mut h = Harness::booted();
    h.session.toggle_breakpoint(&src("a.c"), 3).unwrap();
    h.stdout("Breakpoint 1 at 0x401000: file a.c, line 3.\n(gdb) ");
    h.session.toggle_breakpoint(&src("b.c"), 5).unwrap();
    h.stdout("Breakpoint 2 at 0x402000: b.c:5. (2 locations)\n(gdb) ");
    h.events();

    h.session.on_exit(true);
    assert_eq!(
        h.events(),
        vec![
            DebugEvent::ReadyForInput(false),
            DebugEvent::BreakpointCleared {
                file: src("a.c"),
                line: 2
            },
            DebugEvent::BreakpointCleared {
                file: src("b.c"),
                line: 4
            },
            DebugEvent::SessionEnded,
        ]
    );
    assert!(!h.session.is_running());
    assert!(h.session.link().is_none());
}

#[test]
fn abnormal_exit_is_reported() {
    let mut h = Harness::booted();
    h.session.on_exit(false);
    assert_eq!(
        h.events().first(),
        Some(&DebugEvent::OutputText("*** gdb exited abnormally ***".into()))
    );
}

#[test]
fn launch_failure_is_reported_once() {
    let (tx, events) = mpsc::channel();
    let mut session: Session<Recorder> = Session::new(tx);
    let result = session.start(TargetConfig::new(EXE, WORK_DIR), |_| {
        Err(libgdbctl::GdbCtlError::NotRunning)
    });

    assert!(result.is_err());
    assert!(!session.is_running());
    let events: Vec<DebugEvent> = events.try_iter().collect();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], DebugEvent::LaunchFailed(_)));
}

#[test]
fn restart_on_running_session_requeues_setup() {
    let mut h = Harness::booted();
    let mut config = TargetConfig::new(EXE, WORK_DIR);
    config.custom_init = vec!["set print pretty on".into()];
    h.session
        .start(config, |_| panic!("must not relaunch"))
        .unwrap();

    assert!(h.session.has_pending_tasks());
    h.session.run_tasks().unwrap();
    assert_eq!(h.last_sent().unwrap(), "file /nonexistent-proj/build/app");
    assert_eq!(
        h.queued(),
        vec![
            "set args  ",
            "set inferior-tty /dev/null",
            "set print pretty on",
            "info breakpoints",
        ]
    );
}
