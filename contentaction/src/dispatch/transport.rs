//! IPC transport for fire-and-forget method calls.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::{ActionError, ActionResult};

/// One outbound method call whose only argument is an array of strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusCall {
    pub service: String,

    pub object_path: String,

    pub interface: String,

    pub method: String,

    pub args: Vec<String>,
}

impl BusCall {
    /// `interface.method`
    pub fn member(&self) -> String {
        format!("{}.{}", self.interface, self.method)
    }
}

/// Which message bus to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    #[default]
    Session,

    System,
}

impl BusKind {
    fn flag(self) -> &'static str {
        match self {
            Self::Session => "--user",
            Self::System => "--system",
        }
    }
}

/// Delivers a [`BusCall`]. Success means delivered, not handled.
#[async_trait]
pub trait IpcTransport: Send + Sync {
    async fn call(&self, call: &BusCall) -> ActionResult<()>;
}

/// Sends calls with `busctl`, not waiting for a reply.
#[derive(Debug, Clone)]
pub struct BusctlTransport {
    bus: BusKind,

    timeout: Duration,

    program: String,
}

impl BusctlTransport {
    pub fn new(bus: BusKind, timeout: Duration) -> Self {
        Self {
            bus,
            timeout,
            program: "busctl".to_string(),
        }
    }

    /// Use another `busctl`-compatible binary.
    pub fn with_program<S: Into<String>>(mut self, program: S) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments after the program name.
    pub fn command_args(&self, call: &BusCall) -> Vec<String> {
        let mut args: Vec<String> = vec![
            self.bus.flag().to_string(),
            "--expect-reply=no".to_string(),
            format!("--timeout={}", self.timeout.as_secs().max(1)),
            "call".to_string(),
            "--".to_string(),
            call.service.clone(),
            call.object_path.clone(),
            call.interface.clone(),
            call.method.clone(),
            "as".to_string(),
            call.args.len().to_string(),
        ];
        args.extend(call.args.iter().cloned());
        args
    }
}

#[async_trait]
impl IpcTransport for BusctlTransport {
    async fn call(&self, call: &BusCall) -> ActionResult<()> {
        let args = self.command_args(call);
        debug!("{} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| {
                ActionError::dispatch(
                    call.member(),
                    format!("call to {} timed out after {:?}", call.service, self.timeout),
                )
            })?
            .map_err(|e| ActionError::dispatch(call.member(), format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ActionError::dispatch(
                call.member(),
                format!("{} ({})", stderr.trim(), output.status),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch_call() -> BusCall {
        BusCall {
            service: "org.x.gallery".into(),
            object_path: "/org/maemo/m".into(),
            interface: "com.nokia.MApplicationIf".into(),
            method: "launch".into(),
            args: vec!["file:///a.jpg".into(), "file:///b.jpg".into()],
        }
    }

    #[test]
    fn test_command_args_use_string_array_signature() {
        let transport = BusctlTransport::new(BusKind::Session, Duration::from_secs(5));
        let args = transport.command_args(&launch_call());

        assert_eq!(
            args,
            vec![
                "--user",
                "--expect-reply=no",
                "--timeout=5",
                "call",
                "--",
                "org.x.gallery",
                "/org/maemo/m",
                "com.nokia.MApplicationIf",
                "launch",
                "as",
                "2",
                "file:///a.jpg",
                "file:///b.jpg",
            ]
        );
    }

    #[test]
    fn test_bus_kind_from_config() {
        #[derive(Deserialize)]
        struct Wrapper {
            bus: BusKind,
        }

        let w: Wrapper = toml::from_str("bus = \"system\"").unwrap();
        assert_eq!(w.bus, BusKind::System);
        assert_eq!(BusKind::default(), BusKind::Session);
    }

    #[tokio::test]
    async fn test_missing_program_is_dispatch_error() {
        let transport = BusctlTransport::new(BusKind::Session, Duration::from_secs(1))
            .with_program("/nonexistent/busctl-for-tests");

        let err = transport.call(&launch_call()).await.unwrap_err();
        assert!(matches!(err, ActionError::Dispatch { .. }));
    }
}
