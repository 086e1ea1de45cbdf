use tracing::warn;

use stackway_core::StackInstance;
use stackway_storage::DocumentGateway;

use crate::error::Result;

/// Writes a stack instance, retrying once after a version conflict by
/// rebasing onto the current stored version. Callers already hold the
/// per-instance lock, so a conflict means an out-of-band writer; a second
/// loss surfaces as `EngineError::Conflict`.
pub(crate) async fn write_instance(
    gateway: &DocumentGateway,
    instance: &StackInstance,
    if_match: Option<&str>,
) -> Result<String> {
    match gateway.write_stack_instance(instance, if_match).await {
        Ok(version) => Ok(version),
        Err(err) if err.is_version_conflict() => {
            warn!(instance = %instance.name, "version conflict, retrying once");
            let current = gateway.stack_instance(&instance.name).await?;
            let current_version = current.map(|versioned| versioned.version_id);
            Ok(gateway
                .write_stack_instance(instance, current_version.as_deref())
                .await?)
        }
        Err(err) => Err(err.into()),
    }
}
