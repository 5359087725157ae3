//! Human approval queue.
//!
//! Every non-urgent action waits here for the engineer. Pending actions
//! that outlive their per-urgency timeout are auto-approved on the next
//! sweep (they had their chance), marked as expired. The execution thread
//! blocks on `pop_approved`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use mix_llm::{MixAction, Urgency};

/// Queue behaviour toward incoming actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalMode {
    /// every action needs approval
    ApproveAll,
    /// auto-approve Immediate/Fast urgency
    AutoUrgent,
    /// auto-approve everything (demo/testing)
    AutoAll,
    /// reject everything (safe mode)
    DenyAll,
}

#[derive(Debug, Clone)]
pub struct QueuedAction {
    pub action: MixAction,
    pub queued: Instant,
    /// auto-approve if no response within this time
    pub timeout_ms: u64,
    pub approved: bool,
    pub rejected: bool,
    pub expired: bool,
}

type RejectionHook = Box<dyn Fn(&MixAction) + Send + Sync>;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedAction>,
    approved: VecDeque<QueuedAction>,
    rejected: VecDeque<QueuedAction>,
}

pub struct ApprovalQueue {
    mode: Mutex<ApprovalMode>,
    state: Mutex<QueueState>,
    cv: Condvar,
    rejection_hook: Mutex<Option<RejectionHook>>,
}

fn timeout_for_urgency(urgency: Urgency) -> u64 {
    match urgency {
        Urgency::Immediate => 500,
        Urgency::Fast => 2000,
        Urgency::Normal => 10_000,
        Urgency::Low => 30_000,
    }
}

impl ApprovalQueue {
    pub fn new(mode: ApprovalMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            state: Mutex::new(QueueState::default()),
            cv: Condvar::new(),
            rejection_hook: Mutex::new(None),
        }
    }

    pub fn set_mode(&self, mode: ApprovalMode) {
        *self.mode.lock() = mode;
    }

    pub fn mode(&self) -> ApprovalMode {
        *self.mode.lock()
    }

    /// Hook fired for every rejection (feeds the preference learner).
    pub fn set_rejection_hook(&self, hook: RejectionHook) {
        *self.rejection_hook.lock() = Some(hook);
    }

    fn fire_rejection(&self, action: &MixAction) {
        if let Some(hook) = self.rejection_hook.lock().as_ref() {
            hook(action);
        }
    }

    /// Submit an action for approval. Returns true when it is
    /// auto-approved (caller executes it directly, nothing is queued).
    pub fn submit(&self, action: &MixAction) -> bool {
        let mode = self.mode();

        match mode {
            ApprovalMode::AutoAll => return true,
            ApprovalMode::DenyAll => {
                let mut state = self.state.lock();
                state.rejected.push_back(QueuedAction {
                    action: action.clone(),
                    queued: Instant::now(),
                    timeout_ms: 0,
                    approved: false,
                    rejected: true,
                    expired: false,
                });
                drop(state);
                self.fire_rejection(action);
                return false;
            }
            ApprovalMode::AutoUrgent => {
                if matches!(action.urgency, Urgency::Immediate | Urgency::Fast) {
                    return true;
                }
            }
            ApprovalMode::ApproveAll => {}
        }

        let mut state = self.state.lock();
        state.pending.push_back(QueuedAction {
            action: action.clone(),
            queued: Instant::now(),
            timeout_ms: timeout_for_urgency(action.urgency),
            approved: false,
            rejected: false,
            expired: false,
        });
        self.cv.notify_all();
        false
    }

    /// Pending actions for UI display.
    pub fn pending(&self) -> Vec<QueuedAction> {
        self.state.lock().pending.iter().cloned().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Approve the pending action at `index`.
    pub fn approve(&self, index: usize) -> bool {
        let mut state = self.state.lock();
        let Some(mut item) = state.pending.remove(index) else {
            return false;
        };
        item.approved = true;
        state.approved.push_back(item);
        self.cv.notify_all();
        true
    }

    /// Reject the pending action at `index`.
    pub fn reject(&self, index: usize) -> bool {
        let mut state = self.state.lock();
        let Some(mut item) = state.pending.remove(index) else {
            return false;
        };
        item.rejected = true;
        let action = item.action.clone();
        state.rejected.push_back(item);
        drop(state);
        self.fire_rejection(&action);
        true
    }

    pub fn approve_all(&self) {
        let mut state = self.state.lock();
        while let Some(mut item) = state.pending.pop_front() {
            item.approved = true;
            state.approved.push_back(item);
        }
        self.cv.notify_all();
    }

    pub fn reject_all(&self) {
        let mut rejected = Vec::new();
        {
            let mut state = self.state.lock();
            while let Some(mut item) = state.pending.pop_front() {
                item.rejected = true;
                rejected.push(item.action.clone());
                state.rejected.push_back(item);
            }
        }
        for action in rejected {
            self.fire_rejection(&action);
        }
    }

    /// Pop the next approved action, blocking up to `timeout_ms`. Also
    /// sweeps expired pending actions into the approved queue first.
    pub fn pop_approved(&self, timeout_ms: u64) -> Option<MixAction> {
        let mut state = self.state.lock();
        Self::expire_old(&mut state);

        if let Some(item) = state.approved.pop_front() {
            return Some(item.action);
        }

        self.cv.wait_for(&mut state, Duration::from_millis(timeout_ms));

        Self::expire_old(&mut state);
        state.approved.pop_front().map(|item| item.action)
    }

    fn expire_old(state: &mut QueueState) {
        let now = Instant::now();
        let mut i = 0;
        while i < state.pending.len() {
            let elapsed = now.duration_since(state.pending[i].queued).as_millis() as u64;
            if elapsed > state.pending[i].timeout_ms {
                if let Some(mut item) = state.pending.remove(i) {
                    item.approved = true;
                    item.expired = true;
                    state.approved.push_back(item);
                }
            } else {
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mix_llm::ActionKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn action(urgency: Urgency) -> MixAction {
        MixAction {
            kind: ActionKind::SetFader,
            channel: 3,
            value: 0.8,
            urgency,
            ..MixAction::default()
        }
    }

    #[test]
    fn test_auto_all_never_queues() {
        let queue = ApprovalQueue::new(ApprovalMode::AutoAll);
        for urgency in [Urgency::Immediate, Urgency::Fast, Urgency::Normal, Urgency::Low] {
            assert!(queue.submit(&action(urgency)));
        }
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn test_deny_all_rejects_and_records() {
        let queue = ApprovalQueue::new(ApprovalMode::DenyAll);
        let rejections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&rejections);
        queue.set_rejection_hook(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(!queue.submit(&action(Urgency::Immediate)));
        assert_eq!(queue.pending_count(), 0);
        assert_eq!(rejections.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_auto_urgent_split() {
        // Four urgencies: first two pass, last two queue
        let queue = ApprovalQueue::new(ApprovalMode::AutoUrgent);
        assert!(queue.submit(&action(Urgency::Immediate)));
        assert!(queue.submit(&action(Urgency::Fast)));
        assert!(!queue.submit(&action(Urgency::Normal)));
        assert!(!queue.submit(&action(Urgency::Low)));
        assert_eq!(queue.pending_count(), 2);
    }

    #[test]
    fn test_approve_then_pop() {
        // AutoUrgent + Normal action: queued, approved, popped
        let queue = ApprovalQueue::new(ApprovalMode::AutoUrgent);
        assert!(!queue.submit(&action(Urgency::Normal)));
        assert_eq!(queue.pending_count(), 1);

        assert!(queue.approve(0));
        assert_eq!(queue.pending_count(), 0);

        let popped = queue.pop_approved(100).unwrap();
        assert_eq!(popped.channel, 3);
        assert_eq!(popped.value, 0.8);
    }

    #[test]
    fn test_reject_fires_hook() {
        let queue = ApprovalQueue::new(ApprovalMode::ApproveAll);
        let rejections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&rejections);
        queue.set_rejection_hook(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        queue.submit(&action(Urgency::Normal));
        assert!(queue.reject(0));
        assert_eq!(queue.pending_count(), 0);
        assert_eq!(rejections.load(Ordering::SeqCst), 1);
        assert!(queue.pop_approved(10).is_none());
    }

    #[test]
    fn test_approve_all_and_reject_all() {
        let queue = ApprovalQueue::new(ApprovalMode::ApproveAll);
        for _ in 0..3 {
            queue.submit(&action(Urgency::Normal));
        }
        queue.approve_all();
        assert_eq!(queue.pending_count(), 0);
        assert!(queue.pop_approved(10).is_some());
        assert!(queue.pop_approved(10).is_some());
        assert!(queue.pop_approved(10).is_some());
        assert!(queue.pop_approved(10).is_none());

        for _ in 0..2 {
            queue.submit(&action(Urgency::Normal));
        }
        queue.reject_all();
        assert_eq!(queue.pending_count(), 0);
        assert!(queue.pop_approved(10).is_none());
    }

    #[test]
    fn test_out_of_range_index() {
        let queue = ApprovalQueue::new(ApprovalMode::ApproveAll);
        assert!(!queue.approve(0));
        assert!(!queue.reject(5));
    }

    #[test]
    fn test_expired_actions_auto_approve() {
        let queue = ApprovalQueue::new(ApprovalMode::ApproveAll);
        // Immediate urgency has a 500ms timeout
        queue.submit(&action(Urgency::Immediate));
        assert_eq!(queue.pending_count(), 1);

        std::thread::sleep(Duration::from_millis(550));
        let popped = queue.pop_approved(10);
        assert!(popped.is_some());
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn test_pop_blocks_until_approval() {
        let queue = Arc::new(ApprovalQueue::new(ApprovalMode::ApproveAll));
        queue.submit(&action(Urgency::Low));

        let approver = Arc::clone(&queue);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            approver.approve(0);
        });

        let start = Instant::now();
        let popped = queue.pop_approved(2000);
        handle.join().unwrap();

        assert!(popped.is_some());
        assert!(start.elapsed() < Duration::from_millis(1500));
    }

    #[test]
    fn test_mode_switch() {
        let queue = ApprovalQueue::new(ApprovalMode::ApproveAll);
        assert_eq!(queue.mode(), ApprovalMode::ApproveAll);
        queue.set_mode(ApprovalMode::AutoAll);
        assert_eq!(queue.mode(), ApprovalMode::AutoAll);
        assert!(queue.submit(&action(Urgency::Low)));
    }

    #[test]
    fn test_terminal_state_exclusive() {
        let queue = ApprovalQueue::new(ApprovalMode::ApproveAll);
        queue.submit(&action(Urgency::Normal));
        queue.approve(0);

        let state = queue.state.lock();
        let item = state.approved.front().unwrap();
        assert!(item.approved && !item.rejected && !item.expired);
    }
}
