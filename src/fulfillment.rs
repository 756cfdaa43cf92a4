//! Routing of individual dice to external actors.
//!
//! A [`FulfillmentCoordinator`] belongs to one roll. Dice terms whose
//! denomination is configured for an interactive method park a request in its
//! pending table and suspend until a matching [`register_result`] arrives or
//! the roll is abandoned.
//!
//! [`register_result`]: FulfillmentCoordinator::register_result

use crate::common::*;
use crate::config::FulfillmentConfig;
use crate::error::{EvaluationError, RResult};
use crate::roll::dice::DiceTerm;
use crate::roll::terms::RollTerm;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};

/// Identifies one tracked dice term within a coordinator.
pub type Ticket = usize;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FulfillmentState {
    Unfulfilled,
    AwaitingExternal,
    Fulfilled,
    InternallyRolled,
}

impl FulfillmentState {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Fulfilled | Self::InternallyRolled)
    }
}

/// A die waiting for an external result.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FulfillmentRequest {
    pub id: u64,
    pub method: String,
    pub denomination: Denomination,
    pub ticket: Ticket,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FulfillmentMismatchError {
    #[error("no outstanding {method:?} request for {denomination}")]
    NoRequest { method: String, denomination: String },
    #[error("{result} is not a possible result of {denomination}")]
    OutOfRange { denomination: String, result: Int },
    #[error("{0:?} is not a known denomination")]
    UnknownDenomination(String),
    #[error("the roll was abandoned")]
    Cancelled,
}

struct Pending {
    request: FulfillmentRequest,
    sender: oneshot::Sender<Int>,
}

struct Tracked {
    external: bool,
    state: FulfillmentState,
    awaiting: usize,
}

#[derive(Default)]
struct Table {
    next_id: u64,
    /// Oldest first.
    pending: Vec<Pending>,
    tracked: Vec<Tracked>,
    cancelled: bool,
}

impl Table {
    fn remove(&mut self, index: usize) -> Pending {
        let pending = self.pending.remove(index);
        if let Some(t) = self.tracked.get_mut(pending.request.ticket) {
            t.awaiting = t.awaiting.saturating_sub(1);
        }
        pending
    }

    fn is_complete(&self) -> bool {
        self.tracked.iter().all(|t| t.state.is_done())
    }
}

/// The pending-request table of one roll. Clones share the same table.
#[derive(Clone, Default)]
pub struct FulfillmentCoordinator {
    table: Arc<Mutex<Table>>,
    notify: Arc<Notify>,
}

impl FulfillmentCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a dice term. `method` is its external method, if any.
    pub fn track(&self, denomination: Denomination, method: Option<&str>) -> Ticket {
        let mut table = self.table.lock();
        table.tracked.push(Tracked {
            external: method.is_some(),
            state: FulfillmentState::Unfulfilled,
            awaiting: 0,
        });
        let ticket = table.tracked.len() - 1;
        log::debug!("tracking {} as ticket {} ({})", denomination, ticket, method.unwrap_or("internal"));
        ticket
    }

    /// Parks a request for one die and waits for its result.
    pub async fn request(&self, method: &str, denomination: Denomination, ticket: Ticket) -> RResult<Int> {
        let (sender, receiver) = oneshot::channel();
        let id = {
            let mut table = self.table.lock();
            if table.cancelled {
                return Err(EvaluationError::Cancelled.into());
            }
            let id = table.next_id;
            table.next_id += 1;
            table.pending.push(Pending {
                request: FulfillmentRequest {
                    id,
                    method: method.to_string(),
                    denomination,
                    ticket,
                },
                sender,
            });
            if let Some(t) = table.tracked.get_mut(ticket) {
                t.state = FulfillmentState::AwaitingExternal;
                t.awaiting += 1;
            }
            id
        };
        log::debug!("awaiting {} result for {} (request {})", method, denomination, id);
        self.notify.notify_waiters();

        let _guard = PendingGuard { coordinator: self, id };
        receiver.await.map_err(|_| EvaluationError::Cancelled.into())
    }

    /// Marks a tracked term as done drawing.
    pub fn finish(&self, ticket: Ticket) {
        let mut table = self.table.lock();
        if let Some(t) = table.tracked.get_mut(ticket) {
            t.state = if t.external {
                FulfillmentState::Fulfilled
            } else {
                FulfillmentState::InternallyRolled
            };
        }
        if table.is_complete() {
            log::debug!("all tracked dice are fulfilled");
        }
        drop(table);
        self.notify.notify_waiters();
    }

    /// Feeds an external result to the oldest matching request.
    ///
    /// Returns `false` when nothing accepted the value: no request for that
    /// method and denomination is outstanding, the value cannot come up on
    /// that die, or the roll was abandoned.
    pub fn register_result(&self, method: &str, denomination: &str, result: Int) -> bool {
        match self.try_register_result(method, denomination, result) {
            Ok(()) => true,
            Err(why) => {
                log::warn!("ignoring {} result {} for {}: {}", method, result, denomination, why);
                false
            }
        }
    }

    pub fn try_register_result(
        &self,
        method: &str,
        denomination: &str,
        result: Int,
    ) -> Result<(), FulfillmentMismatchError> {
        let parsed = denomination
            .strip_prefix(|c: char| c == 'd' || c == 'D')
            .and_then(|faces| faces.parse::<Denomination>().ok())
            .ok_or_else(|| FulfillmentMismatchError::UnknownDenomination(denomination.to_string()))?;

        let mut table = self.table.lock();
        if table.cancelled {
            return Err(FulfillmentMismatchError::Cancelled);
        }
        let index = table
            .pending
            .iter()
            .position(|p| p.request.method == method && p.request.denomination == parsed)
            .ok_or_else(|| FulfillmentMismatchError::NoRequest {
                method: method.to_string(),
                denomination: parsed.to_string(),
            })?;
        if !parsed.values().contains(&result) {
            return Err(FulfillmentMismatchError::OutOfRange {
                denomination: parsed.to_string(),
                result,
            });
        }

        let pending = table.remove(index);
        let accepted = pending.sender.send(result).is_ok();
        let complete = table.is_complete();
        drop(table);

        if !accepted {
            return Err(FulfillmentMismatchError::Cancelled);
        }
        log::debug!("request {} fulfilled with {} (complete: {})", pending.request.id, result, complete);
        self.notify.notify_waiters();
        Ok(())
    }

    /// Requests still waiting for a result, oldest first.
    pub fn outstanding(&self) -> Vec<FulfillmentRequest> {
        self.table.lock().pending.iter().map(|p| p.request.clone()).collect()
    }

    /// Waits until a request is outstanding and returns the oldest one.
    /// Returns `None` once the roll has been abandoned.
    pub async fn next_request(&self) -> Option<FulfillmentRequest> {
        loop {
            let notified = self.notify.notified();
            {
                let table = self.table.lock();
                if let Some(p) = table.pending.first() {
                    return Some(p.request.clone());
                }
                if table.cancelled {
                    return None;
                }
            }
            notified.await;
        }
    }

    pub fn state(&self, ticket: Ticket) -> Option<FulfillmentState> {
        self.table.lock().tracked.get(ticket).map(|t| t.state)
    }

    /// Whether every tracked term has left `Unfulfilled` and `AwaitingExternal`.
    pub fn is_complete(&self) -> bool {
        self.table.lock().is_complete()
    }

    pub fn is_cancelled(&self) -> bool {
        self.table.lock().cancelled
    }

    /// Abandons the roll: pending requests fail with
    /// [`EvaluationError::Cancelled`] and later submissions are refused.
    pub fn cancel(&self) {
        let mut table = self.table.lock();
        table.cancelled = true;
        let dropped = table.pending.len();
        table.pending.clear();
        for t in &mut table.tracked {
            t.awaiting = 0;
        }
        drop(table);
        log::debug!("fulfillment cancelled with {} request(s) pending", dropped);
        self.notify.notify_waiters();
    }
}

impl std::fmt::Debug for FulfillmentCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.table.lock();
        f.debug_struct("FulfillmentCoordinator")
            .field("pending", &table.pending.len())
            .field("tracked", &table.tracked.len())
            .field("cancelled", &table.cancelled)
            .finish()
    }
}

/// Removes a request from the table when its future is dropped unanswered.
struct PendingGuard<'a> {
    coordinator: &'a FulfillmentCoordinator,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut table = self.coordinator.table.lock();
        if let Some(index) = table.pending.iter().position(|p| p.request.id == self.id) {
            table.remove(index);
        }
    }
}

/// The dice terms in `terms`, nested ones included, that must be fulfilled
/// externally under `config`.
pub fn identify_fulfillable_terms<'a>(terms: &'a [RollTerm], config: &FulfillmentConfig) -> Vec<&'a DiceTerm> {
    terms
        .iter()
        .flat_map(RollTerm::dice)
        .filter(|d| config.external_method(&d.denomination).is_some())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RollError;
    use futures_util::FutureExt;

    const D20: Denomination = Denomination::Die(20);

    #[test]
    fn test_stray_result_is_rejected() {
        let coordinator = FulfillmentCoordinator::new();
        assert!(!coordinator.register_result("manual", "d20", 12));
        assert_eq!(
            coordinator.try_register_result("manual", "d20", 12),
            Err(FulfillmentMismatchError::NoRequest {
                method: "manual".into(),
                denomination: "d20".into()
            })
        );
        assert_eq!(
            coordinator.try_register_result("manual", "q", 1),
            Err(FulfillmentMismatchError::UnknownDenomination("q".into()))
        );
        assert!(coordinator.is_complete());
    }

    #[tokio::test]
    async fn test_request_and_register() {
        let coordinator = FulfillmentCoordinator::new();
        let ticket = coordinator.track(D20, Some("manual"));
        assert_eq!(coordinator.state(ticket), Some(FulfillmentState::Unfulfilled));

        let actor = async {
            let request = coordinator.next_request().await.unwrap();
            assert_eq!(request.denomination, D20);
            assert_eq!(coordinator.state(ticket), Some(FulfillmentState::AwaitingExternal));
            assert!(!coordinator.register_result("manual", "d6", 3));
            assert!(!coordinator.register_result("manual", "d20", 21));
            assert_eq!(coordinator.outstanding().len(), 1);
            assert!(coordinator.register_result("manual", "d20", 17));
        };
        let (result, ()) = tokio::join!(coordinator.request("manual", D20, ticket), actor);
        assert_eq!(result, Ok(17));
        assert!(!coordinator.is_complete());

        coordinator.finish(ticket);
        assert_eq!(coordinator.state(ticket), Some(FulfillmentState::Fulfilled));
        assert!(coordinator.is_complete());
    }

    #[test]
    fn test_oldest_request_first() {
        let coordinator = FulfillmentCoordinator::new();
        let ticket = coordinator.track(D20, Some("manual"));
        let mut first = Box::pin(coordinator.request("manual", D20, ticket));
        let mut second = Box::pin(coordinator.request("manual", D20, ticket));
        assert!((&mut first).now_or_never().is_none());
        assert!((&mut second).now_or_never().is_none());
        assert_eq!(coordinator.outstanding().len(), 2);

        assert!(coordinator.register_result("manual", "d20", 4));
        assert_eq!((&mut first).now_or_never(), Some(Ok(4)));
        assert!((&mut second).now_or_never().is_none());
        assert_eq!(coordinator.outstanding().len(), 1);
    }

    #[test]
    fn test_cancel_releases_requests() {
        let coordinator = FulfillmentCoordinator::new();
        let ticket = coordinator.track(D20, Some("manual"));
        let mut pending = Box::pin(coordinator.request("manual", D20, ticket));
        assert!((&mut pending).now_or_never().is_none());

        coordinator.cancel();
        assert_eq!(
            (&mut pending).now_or_never(),
            Some(Err(RollError::Evaluation(EvaluationError::Cancelled)))
        );
        assert!(!coordinator.register_result("manual", "d20", 10));
        assert_eq!(coordinator.next_request().now_or_never(), Some(None));
    }

    #[test]
    fn test_dropped_request_leaves_table() {
        let coordinator = FulfillmentCoordinator::new();
        let ticket = coordinator.track(D20, Some("manual"));
        {
            let mut pending = Box::pin(coordinator.request("manual", D20, ticket));
            assert!((&mut pending).now_or_never().is_none());
            assert_eq!(coordinator.outstanding().len(), 1);
        }
        assert!(coordinator.outstanding().is_empty());
        assert!(!coordinator.register_result("manual", "d20", 10));
    }

    #[test]
    fn test_identify_fulfillable_terms() {
        let mut config = FulfillmentConfig::default();
        config.assign(D20, "manual", true);
        let terms = crate::roll::Roll::new("1d20 + 2d6 + max(1d20, 3)").unwrap().terms;
        let found = identify_fulfillable_terms(&terms, &config);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|d| d.denomination == D20));
    }
}
