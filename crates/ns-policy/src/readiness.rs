//! Ad-block rule readiness, signalled over a watch channel.

use std::time::Duration;
use tokio::sync::watch;

/// Producer side, held by whatever compiles the ad-block rules.
#[derive(Debug)]
pub struct ReadinessSignal {
    sender: watch::Sender<bool>,
}

impl ReadinessSignal {
    pub fn mark_ready(&self) {
        self.sender.send_replace(true);
    }

    /// Rules are being recompiled; new decisions wait again.
    pub fn mark_not_ready(&self) {
        self.sender.send_replace(false);
    }

    pub fn gate(&self) -> ReadinessGate {
        ReadinessGate {
            receiver: self.sender.subscribe(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
    /// The signal was dropped before the rules became ready.
    Closed,
}

#[derive(Debug, Clone)]
pub struct ReadinessGate {
    receiver: watch::Receiver<bool>,
}

impl ReadinessGate {
    /// A gate that is already open, for hosts without ad-block compilation.
    pub fn ready() -> Self {
        let (_, receiver) = watch::channel(true);
        Self { receiver }
    }

    pub fn is_ready(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Waits until ready, giving up after `timeout` when one is set.
    pub async fn wait(&self, timeout: Option<Duration>) -> Readiness {
        let mut receiver = self.receiver.clone();
        let ready = async move { receiver.wait_for(|ready| *ready).await.map(|_| ()) };

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, ready).await {
                Ok(outcome) => outcome,
                Err(_) => return Readiness::TimedOut,
            },
            None => ready.await,
        };

        match outcome {
            Ok(()) => Readiness::Ready,
            Err(_) => Readiness::Closed,
        }
    }
}

pub fn readiness_channel() -> (ReadinessSignal, ReadinessGate) {
    let (sender, receiver) = watch::channel(false);
    (ReadinessSignal { sender }, ReadinessGate { receiver })
}

#[cfg(test)]
mod tests {
    use super::Readiness;
    use super::ReadinessGate;
    use super::readiness_channel;
    use std::time::Duration;

    #[tokio::test]
    async fn open_gate_resolves_immediately() {
        let gate = ReadinessGate::ready();
        assert!(gate.is_ready());
        assert_eq!(gate.wait(None).await, Readiness::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_signal() {
        let (signal, gate) = readiness_channel();
        let waiter = tokio::spawn(async move { gate.wait(Some(Duration::from_secs(5))).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.mark_ready();

        match waiter.await {
            Ok(readiness) => assert_eq!(readiness, Readiness::Ready),
            Err(error) => panic!("{error}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_and_reports_closed() {
        let (signal, gate) = readiness_channel();
        assert_eq!(
            gate.wait(Some(Duration::from_millis(50))).await,
            Readiness::TimedOut
        );

        drop(signal);
        assert_eq!(gate.wait(None).await, Readiness::Closed);
    }
}
