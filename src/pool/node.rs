//! The per-slot control state machine.
//!
//! Pure and synchronous: the async runner performs the emitted action
//! and feeds the outcome back into [`resume`](NodeMachine::resume).
//! Keeping it free of I/O makes the transition table unit-testable.

/// The status a pool slot is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeStatus {
    /// The slot's task has not started working yet.
    Initial,

    /// Trying to connect.
    PendingConnect,

    /// Running a liveness ping.
    PendingPing,

    /// Scrubbing session state after a checkout.
    PendingReset,

    /// Healthy and available for handoff.
    Idle,

    /// Handed out to a caller.
    InUse,

    /// Pool shutdown; the slot's task unwinds.
    Terminated,
}

/// The next I/O action the slot's task should perform. There is no 1:1
/// mapping to [`NodeStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeAction {
    /// Establish a session.
    Connect,

    /// Connecting failed: back off for the retry interval.
    SleepConnectFailed,

    /// Wait until the slot is returned by a caller or the ping interval
    /// elapses.
    IdleWait,

    /// Run a liveness ping.
    Ping,

    /// Reset the returned session before reuse.
    Reset,

    /// Exit the task.
    None,
}

/// How an idle-wait ended with respect to a checked-out connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Collection {
    /// The connection was not returned (the wait timed out or the pool
    /// is shutting down).
    None,

    /// The caller returned the connection.
    Returned { reset: bool },
}

pub(crate) struct NodeMachine {
    status: NodeStatus,
    awaiting: Option<NodeAction>,

    // A connect just failed: back off before the next attempt.
    backoff: bool,
}

impl NodeMachine {
    pub(crate) fn new() -> Self {
        Self {
            status: NodeStatus::Initial,
            awaiting: None,
            backoff: false,
        }
    }

    pub(crate) fn status(&self) -> NodeStatus {
        self.status
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.status == NodeStatus::Idle
    }

    /// Hands the slot to a caller. Only valid while idle; performed by
    /// `get_connection` outside the slot's own task, which saves a
    /// reschedule.
    pub(crate) fn mark_in_use(&mut self) {
        debug_assert_eq!(self.status, NodeStatus::Idle);
        self.status = NodeStatus::InUse;
    }

    /// Terminates the slot; the next resume emits [`NodeAction::None`].
    pub(crate) fn cancel(&mut self) {
        self.status = NodeStatus::Terminated;
    }

    /// Feeds back the outcome of the previously emitted action
    /// (`failed` for connect/ping/reset, `collection` for idle-wait)
    /// and returns the next action.
    pub(crate) fn resume(&mut self, failed: bool, collection: Collection) -> NodeAction {
        if let Some(last) = self.awaiting.take() {
            self.apply(last, failed, collection);
        }

        let action = self.next_action();
        if action != NodeAction::None {
            self.awaiting = Some(action);
        }

        action
    }

    fn apply(&mut self, last: NodeAction, failed: bool, collection: Collection) {
        if self.status == NodeStatus::Terminated {
            return;
        }

        match last {
            NodeAction::Connect => {
                if failed {
                    // Status stays PendingConnect; sleep first.
                    self.backoff = true;
                } else {
                    self.status = NodeStatus::Idle;
                }
            }

            NodeAction::SleepConnectFailed => {
                // Retry.
            }

            NodeAction::IdleWait => match collection {
                Collection::Returned { reset: true } => self.status = NodeStatus::PendingReset,
                Collection::Returned { reset: false } => self.status = NodeStatus::Idle,

                Collection::None => {
                    if self.status == NodeStatus::Idle {
                        // The wait ran its course with no interruption:
                        // time to ping.
                        self.status = NodeStatus::PendingPing;
                    }

                    // While in use, the caller simply still holds the
                    // connection; wait again.
                }
            },

            NodeAction::Ping | NodeAction::Reset => {
                self.status = if failed {
                    NodeStatus::PendingConnect
                } else {
                    NodeStatus::Idle
                };
            }

            NodeAction::None => {}
        }
    }

    fn next_action(&mut self) -> NodeAction {
        match self.status {
            NodeStatus::Initial => {
                self.status = NodeStatus::PendingConnect;
                NodeAction::Connect
            }

            NodeStatus::PendingConnect => {
                if self.backoff {
                    self.backoff = false;
                    NodeAction::SleepConnectFailed
                } else {
                    NodeAction::Connect
                }
            }
            NodeStatus::Idle | NodeStatus::InUse => NodeAction::IdleWait,
            NodeStatus::PendingPing => NodeAction::Ping,
            NodeStatus::PendingReset => NodeAction::Reset,
            NodeStatus::Terminated => NodeAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resume_ok(machine: &mut NodeMachine) -> NodeAction {
        machine.resume(false, Collection::None)
    }

    #[test]
    fn it_connects_then_idles() {
        let mut machine = NodeMachine::new();

        assert_eq!(resume_ok(&mut machine), NodeAction::Connect);
        assert_eq!(machine.status(), NodeStatus::PendingConnect);

        assert_eq!(resume_ok(&mut machine), NodeAction::IdleWait);
        assert_eq!(machine.status(), NodeStatus::Idle);
    }

    #[test]
    fn failed_connects_back_off_and_retry() {
        let mut machine = NodeMachine::new();

        assert_eq!(resume_ok(&mut machine), NodeAction::Connect);
        assert_eq!(
            machine.resume(true, Collection::None),
            NodeAction::SleepConnectFailed
        );
        assert_eq!(machine.status(), NodeStatus::PendingConnect);

        // After the sleep, connect again; this time it succeeds.
        assert_eq!(resume_ok(&mut machine), NodeAction::Connect);
        assert_eq!(resume_ok(&mut machine), NodeAction::IdleWait);
        assert_eq!(machine.status(), NodeStatus::Idle);
    }

    #[test]
    fn an_uninterrupted_idle_wait_pings() {
        let mut machine = NodeMachine::new();
        resume_ok(&mut machine);
        resume_ok(&mut machine);

        // ping interval elapsed, no collection
        assert_eq!(resume_ok(&mut machine), NodeAction::Ping);
        assert_eq!(machine.status(), NodeStatus::PendingPing);

        // ping succeeded
        assert_eq!(resume_ok(&mut machine), NodeAction::IdleWait);
        assert_eq!(machine.status(), NodeStatus::Idle);
    }

    #[test]
    fn a_failed_ping_reconnects() {
        let mut machine = NodeMachine::new();
        resume_ok(&mut machine);
        resume_ok(&mut machine);
        resume_ok(&mut machine); // -> Ping

        assert_eq!(machine.resume(true, Collection::None), NodeAction::Connect);
        assert_eq!(machine.status(), NodeStatus::PendingConnect);
    }

    #[test]
    fn a_returned_connection_is_reset_then_idled() {
        let mut machine = NodeMachine::new();
        resume_ok(&mut machine); // Connect
        resume_ok(&mut machine); // IdleWait, Idle

        machine.mark_in_use();
        assert_eq!(machine.status(), NodeStatus::InUse);

        // still in use: the wait loops
        assert_eq!(resume_ok(&mut machine), NodeAction::IdleWait);
        assert_eq!(machine.status(), NodeStatus::InUse);

        // returned with reset requested
        assert_eq!(
            machine.resume(false, Collection::Returned { reset: true }),
            NodeAction::Reset
        );
        assert_eq!(machine.status(), NodeStatus::PendingReset);

        assert_eq!(resume_ok(&mut machine), NodeAction::IdleWait);
        assert_eq!(machine.status(), NodeStatus::Idle);
    }

    #[test]
    fn a_failed_reset_reconnects() {
        let mut machine = NodeMachine::new();
        resume_ok(&mut machine);
        resume_ok(&mut machine);
        machine.mark_in_use();
        resume_ok(&mut machine);
        machine.resume(false, Collection::Returned { reset: true });

        assert_eq!(machine.resume(true, Collection::None), NodeAction::Connect);
    }

    #[test]
    fn cancel_terminates_from_any_state() {
        let mut machine = NodeMachine::new();
        resume_ok(&mut machine);

        machine.cancel();
        assert_eq!(resume_ok(&mut machine), NodeAction::None);
        assert_eq!(machine.status(), NodeStatus::Terminated);
    }
}
