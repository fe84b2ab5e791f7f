use tracing::info;

use crate::messages::MotionEvent;

/// Receives the controller's position notifications
pub trait MotionObserver {
    fn observe(&mut self, event: MotionEvent);
}

/// Default observer: turns events into `info` log lines
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl MotionObserver for LogObserver {
    fn observe(&mut self, event: MotionEvent) {
        match event {
            MotionEvent::Homed { position } => info!(position, "Homed to: {}", position),
            MotionEvent::Position { position } => info!(position, "Position: {}", position),
        }
    }
}

impl<F> MotionObserver for F
where
    F: FnMut(MotionEvent),
{
    fn observe(&mut self, event: MotionEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_log_observer() {
        let mut observer = LogObserver;
        observer.observe(MotionEvent::Homed { position: 0 });
        observer.observe(MotionEvent::Position { position: -42 });
        assert!(logs_contain("Homed to: 0"));
        assert!(logs_contain("Position: -42"));
    }

    #[test]
    fn test_closure_observer() {
        let mut seen = Vec::new();
        {
            let mut observer = |event: MotionEvent| seen.push(event.position());
            observer.observe(MotionEvent::Position { position: 7 });
        }
        assert_eq!(seen, vec![7]);
    }
}
