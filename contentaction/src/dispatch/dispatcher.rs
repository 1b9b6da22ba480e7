//! src/dispatch/dispatcher.rs
//! ============================================================================
//! # Dispatcher: One Trigger, One Outbound Call
//!
//! Maps an [`Invocation`] to the transport that performs it. Every kind is
//! fire-and-forget: a bus call succeeds once delivered, a process once
//! started. Nothing is retried; a failed trigger is reported to the caller
//! as an [`ActionError`] value.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::discovery::ServiceDiscovery;
use super::exec::{self, ProcessSpawner};
use super::transport::{BusCall, IpcTransport};
use crate::error::{ActionError, ActionResult};
use crate::model::{ActionDescriptor, Invocation};

/// Standard application launch interface.
pub const LAUNCH_INTERFACE: &str = "com.nokia.MApplicationIf";
pub const LAUNCH_METHOD: &str = "launch";
pub const LAUNCH_OBJECT_PATH: &str = "/org/maemo/m";

/// Deprecated opener method, called on the service's own interface.
pub const LEGACY_OPEN_METHOD: &str = "mime_open";

pub struct Dispatcher {
    transport: Arc<dyn IpcTransport>,

    spawner: Arc<dyn ProcessSpawner>,

    discovery: Arc<dyn ServiceDiscovery>,

    /// Upper bound for delivering one call.
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn IpcTransport>,
        spawner: Arc<dyn ProcessSpawner>,
        discovery: Arc<dyn ServiceDiscovery>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            spawner,
            discovery,
            timeout,
        }
    }

    /// Invoke `descriptor` on `targets`. Returns once the call is dispatched.
    #[instrument(
        skip_all,
        fields(action = %descriptor.id, kind = descriptor.invocation.kind_name())
    )]
    pub async fn trigger(
        &self,
        descriptor: &ActionDescriptor,
        targets: &[String],
    ) -> ActionResult<()> {
        match &descriptor.invocation {
            Invocation::AppLaunch { service } => {
                let call = BusCall {
                    service: service.clone(),
                    object_path: LAUNCH_OBJECT_PATH.to_string(),
                    interface: LAUNCH_INTERFACE.to_string(),
                    method: LAUNCH_METHOD.to_string(),
                    args: targets.to_vec(),
                };
                self.deliver(descriptor, call).await
            }

            Invocation::MethodCall {
                service,
                interface,
                method,
                object_path,
                fixed_args,
            } => {
                let destination = match service {
                    Some(service) => service.clone(),
                    None => self.discovery.implementor(interface).ok_or_else(|| {
                        ActionError::dispatch(
                            &descriptor.id,
                            format!("no implementor found for interface {interface}"),
                        )
                    })?,
                };

                let mut args: Vec<String> = fixed_args.clone();
                args.extend(targets.iter().cloned());

                let call = BusCall {
                    service: destination,
                    object_path: object_path.clone(),
                    interface: interface.clone(),
                    method: method.clone(),
                    args,
                };
                self.deliver(descriptor, call).await
            }

            Invocation::Exec { command } => {
                let argv = exec::expand(command, targets)
                    .map_err(|reason| ActionError::spawn(&descriptor.id, reason))?;

                self.spawner.spawn(&argv).map_err(|e| {
                    warn!("Failed to start {:?}: {}", argv, e);
                    ActionError::spawn(&descriptor.id, e.to_string())
                })?;

                info!("Started {}", argv.join(" "));
                Ok(())
            }

            Invocation::LegacyOpen { service } => {
                let call = BusCall {
                    service: service.clone(),
                    object_path: legacy_object_path(service),
                    interface: service.clone(),
                    method: LEGACY_OPEN_METHOD.to_string(),
                    args: targets.to_vec(),
                };
                self.deliver(descriptor, call).await
            }
        }
    }

    async fn deliver(&self, descriptor: &ActionDescriptor, call: BusCall) -> ActionResult<()> {
        debug!(
            "Calling {} on {} at {} with {} args",
            call.member(),
            call.service,
            call.object_path,
            call.args.len()
        );

        match tokio::time::timeout(self.timeout, self.transport.call(&call)).await {
            Ok(Ok(())) => {
                info!("Delivered {} to {}", call.member(), call.service);
                Ok(())
            }

            Ok(Err(ActionError::Dispatch { reason, .. })) => {
                warn!("Call {} to {} failed: {}", call.member(), call.service, reason);
                Err(ActionError::dispatch(&descriptor.id, reason))
            }

            Ok(Err(e)) => Err(ActionError::dispatch(&descriptor.id, e.to_string())),

            Err(_) => {
                warn!("Call {} to {} timed out", call.member(), call.service);
                Err(ActionError::dispatch(
                    &descriptor.id,
                    format!("delivery timed out after {:?}", self.timeout),
                ))
            }
        }
    }
}

/// `com.example.app` -> `/com/example/app`
pub fn legacy_object_path(service: &str) -> String {
    format!("/{}", service.replace('.', "/"))
}
