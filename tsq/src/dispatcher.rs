use std::{fmt, sync::Arc};

use tsq_common::{incoming, internal};
use tsq_storage::{Record, RecordId, StorageService};

use crate::action::{Action, DispatchError};

/// The successful outcome of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Created(RecordId),
    Record(Record),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created(id) => write!(f, " - Created: {id}"),
            Self::Record(record) => write!(f, " - {record}"),
        }
    }
}

/// Render the outcome of an action as the single line shown to the operator.
#[must_use]
pub fn render(outcome: &Result<Reply, DispatchError>) -> String {
    match outcome {
        Ok(reply) => reply.to_string(),
        Err(err) => format!(" - {err}"),
    }
}

/// Routes action lines to whichever storage service is currently bound
///
/// The binding is owned here and changed only through [`Dispatcher::bind`] and
/// [`Dispatcher::unbind`]; the service is activated when bound and deactivated
/// when it stops being bound.
#[derive(Debug, Default)]
pub struct Dispatcher {
    service: Option<Arc<dyn StorageService>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `service` the bound service, replacing any previous binding
    ///
    /// # Errors
    /// If `service` fails to activate, in which case the previous binding is
    /// left as it was. A failure deactivating the previous service is logged
    /// and does not prevent the new binding.
    pub async fn bind(&mut self, service: Arc<dyn StorageService>) -> tsq_storage::Result<()> {
        internal!(level = INFO, "Binding {}", service.name());
        service.activate().await?;

        if let Some(previous) = self.service.replace(service) {
            internal!(level = INFO, "Unbinding {}", previous.name());
            if let Err(err) = previous.deactivate().await {
                internal!(
                    level = WARN,
                    "Failed to deactivate {}: {err}",
                    previous.name()
                );
            }
        }

        Ok(())
    }

    /// Stop using `service`, if it is the bound one
    ///
    /// Returns `true` if `service` was bound. Any other service is left bound.
    ///
    /// # Errors
    /// If `service` fails to deactivate; it is unbound regardless
    pub async fn unbind(&mut self, service: &Arc<dyn StorageService>) -> tsq_storage::Result<bool> {
        internal!(level = INFO, "Unbinding {}", service.name());

        match self.service.take_if(|bound| Arc::ptr_eq(bound, service)) {
            Some(bound) => {
                bound.deactivate().await?;
                Ok(true)
            }
            None => {
                internal!(level = INFO, "{} is already unbound", service.name());
                Ok(false)
            }
        }
    }

    /// The currently bound service.
    #[must_use]
    pub fn bound(&self) -> Option<&Arc<dyn StorageService>> {
        self.service.as_ref()
    }

    /// Parse `line` and run it against the bound service
    ///
    /// A malformed line is reported as such whether or not a service is bound.
    ///
    /// # Errors
    /// If the line is not a valid action, no service is bound, or the service
    /// fails
    pub async fn dispatch(&self, line: &str) -> Result<Reply, DispatchError> {
        incoming!("{line}");

        let action = Action::parse(line)?;
        let service = self.service.as_ref().ok_or(DispatchError::NotBound)?;

        match action {
            Action::Put(record) => {
                internal!("Putting using bound service {}", service.name());
                Ok(Reply::Created(service.put(&record).await?))
            }
            Action::Get(id) => {
                internal!("Getting {id} using bound service {}", service.name());
                Ok(Reply::Record(service.get(id).await?))
            }
        }
    }
}
