//! Command dispatcher - routes decoded requests to their handler

use super::handlers::{self, HandlerContext, HandlerError, HandlerResult};
use crate::action::ActionRunner;
use crate::config::ScriptPaths;
use bmc_shared::{cmd, netfn, CompletionCode, DeviceIdentity, Request, Response};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

/// Operations the BMC answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetDeviceId,
    GetPowerStatus,
    ChassisControl,
    SetBootDevice,
    GetBootParameter,
}

/// (netfn, command) -> operation
static COMMAND_TABLE: [((u8, u8), Operation); 5] = [
    ((netfn::APP, cmd::GET_DEVICE_ID), Operation::GetDeviceId),
    ((netfn::CHASSIS, cmd::GET_CHASSIS_STATUS), Operation::GetPowerStatus),
    ((netfn::CHASSIS, cmd::CHASSIS_CONTROL), Operation::ChassisControl),
    ((netfn::CHASSIS, cmd::SET_SYSTEM_BOOT_OPTIONS), Operation::SetBootDevice),
    ((netfn::CHASSIS, cmd::GET_SYSTEM_BOOT_OPTIONS), Operation::GetBootParameter),
];

impl Operation {
    pub fn lookup(net_fn: u8, command: u8) -> Option<Self> {
        COMMAND_TABLE
            .iter()
            .find(|(key, _)| *key == (net_fn, command))
            .map(|(_, operation)| *operation)
    }
}

/// Answers IPMI requests by running the configured action scripts
pub struct CommandDispatcher {
    managed_host: String,
    scripts: ScriptPaths,
    runner: Arc<dyn ActionRunner>,
    identity: DeviceIdentity,
}

impl CommandDispatcher {
    /// Create a new command dispatcher
    pub fn new(
        managed_host: impl Into<String>,
        scripts: ScriptPaths,
        runner: Arc<dyn ActionRunner>,
    ) -> Self {
        Self {
            managed_host: managed_host.into(),
            scripts,
            runner,
            identity: DeviceIdentity::default(),
        }
    }

    /// Handle one request and produce its response.
    ///
    /// Never fails: unknown commands get 0xC1 and any handler failure,
    /// panics included, is logged and answered with 0xFF.
    pub async fn handle(&self, request: &Request) -> Response {
        let Some(operation) = Operation::lookup(request.net_fn, request.command) else {
            return Response::completion(CompletionCode::INVALID_COMMAND);
        };

        let ctx = HandlerContext {
            client: request.client,
            managed_host: &self.managed_host,
            scripts: &self.scripts,
            runner: self.runner.as_ref(),
            identity: &self.identity,
        };

        let result = AssertUnwindSafe(dispatch(operation, &ctx, request))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic.as_ref()))));

        match result {
            Ok(response) => response,
            Err(e) => {
                error!(
                    client = %request.client,
                    net_fn = request.net_fn,
                    command = request.command,
                    "{}: Unexpected error while handling IPMI request: netfn={}; command={}: {}",
                    request.client,
                    request.net_fn,
                    request.command,
                    e
                );
                Response::completion(CompletionCode::UNSPECIFIED_ERROR)
            }
        }
    }
}

async fn dispatch(operation: Operation, ctx: &HandlerContext<'_>, request: &Request) -> HandlerResult {
    match operation {
        Operation::GetDeviceId => handlers::handle_get_device_id(ctx, request).await,
        Operation::GetPowerStatus => handlers::handle_get_power_status(ctx, request).await,
        Operation::ChassisControl => handlers::handle_chassis_control(ctx, request).await,
        Operation::SetBootDevice => handlers::handle_set_boot_device(ctx, request).await,
        Operation::GetBootParameter => handlers::handle_get_boot_parameter(ctx, request).await,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionError, ProcessRunner};
    use crate::logging::capture::CapturedLogs;
    use async_trait::async_trait;
    use std::net::IpAddr;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::Duration;

    /// What the fake script run returns
    #[derive(Clone)]
    enum Reply {
        Stdout(&'static str),
        Exit(i32),
        Panic,
    }

    /// Records script invocations instead of running anything
    struct RecordingRunner {
        reply: Reply,
        calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
    }

    impl RecordingRunner {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(PathBuf, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ActionRunner for RecordingRunner {
        async fn run(&self, program: &Path, args: &[&str]) -> Result<String, ActionError> {
            self.calls.lock().unwrap().push((
                program.to_path_buf(),
                args.iter().map(|a| a.to_string()).collect(),
            ));
            match &self.reply {
                Reply::Stdout(out) => Ok(out.to_string()),
                Reply::Exit(code) => Err(ActionError::Exited {
                    program: program.to_path_buf(),
                    code: Some(*code),
                }),
                Reply::Panic => panic!("runner exploded"),
            }
        }
    }

    fn scripts() -> ScriptPaths {
        ScriptPaths {
            power_action: "/scripts/power-action.sh".into(),
            power_status: "/scripts/power-status.sh".into(),
            boot_device_set: "/scripts/chassis-bootdev.sh".into(),
            boot_device_get: "/scripts/chassis-bootparam-get.sh".into(),
        }
    }

    fn client() -> IpAddr {
        "192.0.2.10".parse().unwrap()
    }

    fn request(net_fn: u8, command: u8, data: &[u8]) -> Request {
        Request::new(net_fn, command, data.to_vec(), client())
    }

    fn dispatcher(runner: Arc<RecordingRunner>) -> CommandDispatcher {
        CommandDispatcher::new("localhost", scripts(), runner)
    }

    async fn handle(reply: Reply, req: Request) -> (Response, Vec<(PathBuf, Vec<String>)>) {
        let runner = RecordingRunner::new(reply);
        let response = dispatcher(runner.clone()).handle(&req).await;
        (response, runner.calls())
    }

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_lookup_table() {
        assert_eq!(Operation::lookup(0x06, 0x01), Some(Operation::GetDeviceId));
        assert_eq!(Operation::lookup(0x00, 0x01), Some(Operation::GetPowerStatus));
        assert_eq!(Operation::lookup(0x00, 0x02), Some(Operation::ChassisControl));
        assert_eq!(Operation::lookup(0x00, 0x08), Some(Operation::SetBootDevice));
        assert_eq!(Operation::lookup(0x00, 0x09), Some(Operation::GetBootParameter));
        assert_eq!(Operation::lookup(0x06, 0x02), None);
        assert_eq!(Operation::lookup(0x01, 0x01), None);
    }

    #[tokio::test]
    async fn test_unknown_command_is_invalid() {
        for (net_fn, command) in [(0x00, 0x00), (0x00, 0x03), (0x06, 0x04), (0x0A, 0x10), (0x2C, 0x01)] {
            let (response, calls) = handle(Reply::Stdout("on"), request(net_fn, command, &[5, 0, 4])).await;
            assert_eq!(response, Response::completion(CompletionCode::INVALID_COMMAND));
            assert!(calls.is_empty());
        }
    }

    #[tokio::test]
    async fn test_device_id_needs_no_script() {
        let (response, calls) = handle(Reply::Exit(1), request(netfn::APP, cmd::GET_DEVICE_ID, &[])).await;
        assert!(response.completion.is_success());
        assert_eq!(response.data, DeviceIdentity::default().encode());
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn test_power_status_on_variants() {
        for output in ["on", "ON", "On"] {
            let (response, calls) =
                handle(Reply::Stdout(output), request(netfn::CHASSIS, cmd::GET_CHASSIS_STATUS, &[])).await;
            assert_eq!(response, Response::with_data(vec![1, 0, 0]));
            assert_eq!(calls, vec![(PathBuf::from("/scripts/power-status.sh"), args(&["localhost"]))]);
        }
    }

    #[tokio::test]
    async fn test_power_status_off_variants() {
        for output in ["off", "OFF", "Off"] {
            let (response, _) =
                handle(Reply::Stdout(output), request(netfn::CHASSIS, cmd::GET_CHASSIS_STATUS, &[])).await;
            assert_eq!(response, Response::with_data(vec![0, 0, 0]));
        }
    }

    #[tokio::test]
    async fn test_power_status_unexpected_output() {
        for output in ["", "standby", "on off"] {
            let (response, _) =
                handle(Reply::Stdout(output), request(netfn::CHASSIS, cmd::GET_CHASSIS_STATUS, &[])).await;
            assert_eq!(response, Response::completion(CompletionCode::UNSPECIFIED_ERROR));
        }
    }

    #[tokio::test]
    async fn test_power_status_script_failure() {
        let (response, _) = handle(Reply::Exit(1), request(netfn::CHASSIS, cmd::GET_CHASSIS_STATUS, &[])).await;
        assert_eq!(response.completion, CompletionCode::UNSPECIFIED_ERROR);
        assert!(response.data.is_empty());
    }

    #[tokio::test]
    async fn test_chassis_control_actions() {
        let expected = ["off", "on", "cycle", "reset", "diag", "soft"];
        for (code, word) in expected.iter().enumerate() {
            let (response, calls) = handle(
                Reply::Stdout(""),
                request(netfn::CHASSIS, cmd::CHASSIS_CONTROL, &[code as u8]),
            )
            .await;
            assert_eq!(response, Response::success());
            assert_eq!(
                calls,
                vec![(PathBuf::from("/scripts/power-action.sh"), args(&["localhost", word]))]
            );
        }
    }

    #[tokio::test]
    async fn test_chassis_control_unknown_code() {
        let (response, calls) =
            handle(Reply::Stdout(""), request(netfn::CHASSIS, cmd::CHASSIS_CONTROL, &[6])).await;
        assert_eq!(response, Response::completion(CompletionCode::UNSPECIFIED_ERROR));
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn test_chassis_control_empty_payload() {
        let (response, calls) =
            handle(Reply::Stdout(""), request(netfn::CHASSIS, cmd::CHASSIS_CONTROL, &[])).await;
        assert_eq!(response, Response::completion(CompletionCode::UNSPECIFIED_ERROR));
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn test_chassis_control_script_failure() {
        let (response, calls) = handle(Reply::Exit(2), request(netfn::CHASSIS, cmd::CHASSIS_CONTROL, &[1])).await;
        assert_eq!(response, Response::completion(CompletionCode::UNSPECIFIED_ERROR));
        assert_eq!(calls.len(), 1);
    }

    #[tokio::test]
    async fn test_boot_parameter_unsupported_selector() {
        for selector in [0, 1, 4, 6, 0x65] {
            let (response, calls) = handle(
                Reply::Stdout("pxe"),
                request(netfn::CHASSIS, cmd::GET_SYSTEM_BOOT_OPTIONS, &[selector, 0, 0]),
            )
            .await;
            assert_eq!(response, Response::completion(CompletionCode::PARAMETER_NOT_SUPPORTED));
            assert!(calls.is_empty());
        }
    }

    #[tokio::test]
    async fn test_boot_parameter_devices() {
        for (output, code) in [("pxe", 0x04), ("cdrom", 0x14), ("disk", 0x08)] {
            let (response, calls) = handle(
                Reply::Stdout(output),
                request(netfn::CHASSIS, cmd::GET_SYSTEM_BOOT_OPTIONS, &[5, 0, 0]),
            )
            .await;
            assert_eq!(response, Response::with_data(vec![1, 5, 0b1000_0000, code, 0, 0, 0]));
            assert_eq!(
                calls,
                vec![(PathBuf::from("/scripts/chassis-bootparam-get.sh"), args(&["localhost", "5"]))]
            );
        }
    }

    #[tokio::test]
    async fn test_boot_parameter_unexpected_output() {
        for output in ["floppy", "PXE", ""] {
            let (response, _) = handle(
                Reply::Stdout(output),
                request(netfn::CHASSIS, cmd::GET_SYSTEM_BOOT_OPTIONS, &[5, 0, 0]),
            )
            .await;
            assert_eq!(response, Response::completion(CompletionCode::UNSPECIFIED_ERROR));
        }
    }

    #[tokio::test]
    async fn test_set_boot_device_noops() {
        for code in [0, 3, 4] {
            let (response, calls) = handle(
                Reply::Exit(1),
                request(netfn::CHASSIS, cmd::SET_SYSTEM_BOOT_OPTIONS, &[code, 0, 0]),
            )
            .await;
            assert_eq!(response, Response::success());
            assert!(calls.is_empty());
        }
    }

    #[tokio::test]
    async fn test_set_boot_device_selectors() {
        for (flags, device) in [(0b0000_0100, "pxe"), (0b0001_0100, "cdrom"), (0b0000_1000, "disk")] {
            let (response, calls) = handle(
                Reply::Stdout(""),
                request(netfn::CHASSIS, cmd::SET_SYSTEM_BOOT_OPTIONS, &[5, 0x80, flags, 0, 0]),
            )
            .await;
            assert_eq!(response, Response::success());
            assert_eq!(
                calls,
                vec![(PathBuf::from("/scripts/chassis-bootdev.sh"), args(&["localhost", device]))]
            );
        }
    }

    #[tokio::test]
    async fn test_set_boot_device_invalid_selector() {
        for selector in [0u8, 3, 4, 6, 15] {
            let (response, calls) = handle(
                Reply::Stdout(""),
                request(netfn::CHASSIS, cmd::SET_SYSTEM_BOOT_OPTIONS, &[5, 0x80, selector << 2]),
            )
            .await;
            assert_eq!(response, Response::completion(CompletionCode::INVALID_DATA_FIELD));
            assert!(calls.is_empty());
        }
    }

    #[tokio::test]
    async fn test_set_boot_device_unknown_subcommand() {
        for code in [1, 2, 6, 0x7F] {
            let (response, calls) = handle(
                Reply::Stdout(""),
                request(netfn::CHASSIS, cmd::SET_SYSTEM_BOOT_OPTIONS, &[code, 0, 0x04]),
            )
            .await;
            assert_eq!(response, Response::completion(CompletionCode::INVALID_COMMAND));
            assert!(calls.is_empty());
        }
    }

    #[tokio::test]
    async fn test_set_boot_device_short_payload() {
        let (response, calls) = handle(
            Reply::Stdout(""),
            request(netfn::CHASSIS, cmd::SET_SYSTEM_BOOT_OPTIONS, &[5, 0x80]),
        )
        .await;
        assert_eq!(response, Response::completion(CompletionCode::UNSPECIFIED_ERROR));
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let runner = RecordingRunner::new(Reply::Panic);
        let dispatcher = dispatcher(runner.clone());

        let response = dispatcher
            .handle(&request(netfn::CHASSIS, cmd::GET_CHASSIS_STATUS, &[]))
            .await;
        assert_eq!(response, Response::completion(CompletionCode::UNSPECIFIED_ERROR));

        // The dispatcher keeps serving afterwards
        let response = dispatcher.handle(&request(netfn::APP, cmd::GET_DEVICE_ID, &[])).await;
        assert!(response.completion.is_success());
    }

    fn write_script(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Scripts that append their arguments to `calls.log` and print `stdout`
    fn script_dispatcher(dir: &tempfile::TempDir, stdout: &str) -> CommandDispatcher {
        let log = dir.path().join("calls.log");
        let body = format!("echo \"$@\" >> '{}'\nprintf '{}'", log.display(), stdout);
        let scripts = ScriptPaths {
            power_action: write_script(dir, "power-action.sh", &body),
            power_status: write_script(dir, "power-status.sh", &body),
            boot_device_set: write_script(dir, "chassis-bootdev.sh", &body),
            boot_device_get: write_script(dir, "chassis-bootparam-get.sh", &body),
        };
        let runner = Arc::new(ProcessRunner::new(Duration::from_secs(5)));
        CommandDispatcher::new("localhost", scripts, runner)
    }

    fn logged_calls(dir: &tempfile::TempDir) -> String {
        std::fs::read_to_string(dir.path().join("calls.log")).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_end_to_end_power_status() {
        let dir = tempfile::TempDir::new().unwrap();
        let dispatcher = script_dispatcher(&dir, "On\\n");

        let response = dispatcher
            .handle(&request(netfn::CHASSIS, cmd::GET_CHASSIS_STATUS, &[]))
            .await;
        assert_eq!(response.completion, CompletionCode::SUCCESS);
        assert_eq!(response.data[0], 1);
        assert_eq!(logged_calls(&dir), "localhost\n");
    }

    #[tokio::test]
    async fn test_end_to_end_set_boot_device_pxe() {
        let dir = tempfile::TempDir::new().unwrap();
        let dispatcher = script_dispatcher(&dir, "");

        let response = dispatcher
            .handle(&request(netfn::CHASSIS, cmd::SET_SYSTEM_BOOT_OPTIONS, &[5, 0x80, 0b0000_0100, 0, 0]))
            .await;
        assert_eq!(response, Response::success());
        assert_eq!(logged_calls(&dir), "localhost pxe\n");
    }

    #[tokio::test]
    async fn test_end_to_end_failing_script() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("unused.log");
        let failing = write_script(&dir, "power-action.sh", "echo 'host unreachable' >&2; exit 1");
        let scripts = ScriptPaths {
            power_action: failing,
            power_status: log.clone(),
            boot_device_set: log.clone(),
            boot_device_get: log,
        };
        let dispatcher = CommandDispatcher::new(
            "localhost",
            scripts,
            Arc::new(ProcessRunner::new(Duration::from_secs(5))),
        );

        let (logs, _guard) = CapturedLogs::install();
        let response = dispatcher
            .handle(&request(netfn::CHASSIS, cmd::CHASSIS_CONTROL, &[2]))
            .await;
        assert_eq!(response, Response::completion(CompletionCode::UNSPECIFIED_ERROR));

        let stderr = logs.line_with("host unreachable").expect("stderr line not logged");
        assert!(stderr.contains("INFO"), "{stderr}");
        let failure = logs.line_with("netfn=0; command=2").expect("failure not logged");
        assert!(failure.contains("ERROR"), "{failure}");
        assert!(failure.contains("192.0.2.10"), "{failure}");
        assert!(failure.contains("returncode=Some(1)"), "{failure}");
    }
}
