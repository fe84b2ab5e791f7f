// High-level controller for one ELL7 stage
//
// Every operation is one half-duplex exchange: write a command frame, poll
// until a terminated response arrives, decode the position it reports.

use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::observer::{LogObserver, MotionObserver};
use super::protocol::{
    extract_position, response_tag, Command, Ell7Error, FrameAssembler, Result, POSITION_TAG,
};
use super::transport::{SerialTransport, Transport};
use crate::config::ControllerConfig;
use crate::messages::MotionEvent;

/// Controller owning the serial link to a single stage
pub struct MotionController<T: Transport = SerialTransport> {
    transport: T,
    config: ControllerConfig,
    assembler: FrameAssembler,
    observer: Box<dyn MotionObserver + Send>,
}

impl MotionController<SerialTransport> {
    /// Open the stage on `address` with default timing, then home it
    pub fn open(address: &str) -> Result<Self> {
        Self::open_with_config(address, ControllerConfig::default())
    }

    /// Open the stage with custom timing, then home it
    pub fn open_with_config(address: &str, config: ControllerConfig) -> Result<Self> {
        info!("Opening ELL7 stage on {}", address);
        let transport = SerialTransport::open(address, config.timeout)?;
        Self::with_transport(transport, config)
    }
}

impl<T: Transport> MotionController<T> {
    /// Take over an already open transport and home the stage.
    ///
    /// Blocks until homing completes or `home_timeout` elapses.
    pub fn with_transport(transport: T, config: ControllerConfig) -> Result<Self> {
        Self::with_observer(transport, config, Box::new(LogObserver))
    }

    /// Like [`with_transport`](Self::with_transport), reporting to a custom observer
    pub fn with_observer(
        transport: T,
        config: ControllerConfig,
        observer: Box<dyn MotionObserver + Send>,
    ) -> Result<Self> {
        let mut controller = Self {
            transport,
            config,
            assembler: FrameAssembler::new(),
            observer,
        };
        controller.sleep();
        controller.home()?;
        Ok(controller)
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sleep one polling interval
    pub fn sleep(&self) {
        self.sleep_for(self.config.poll_interval);
    }

    pub fn sleep_for(&self, duration: Duration) {
        thread::sleep(duration);
    }

    /// Home the stage and return the position it settles at.
    ///
    /// Frames other than position reports (status updates, empty lines) are
    /// skipped until the stage reports where it homed to.
    pub fn home(&mut self) -> Result<i32> {
        self.send(Command::Home)?;
        self.sleep();

        let started = Instant::now();
        let deadline = started + self.config.home_timeout;
        let timed_out = |started: Instant| Ell7Error::Timeout {
            waited: started.elapsed(),
            awaiting: "homing to complete",
        };
        loop {
            if Instant::now() >= deadline {
                return Err(timed_out(started));
            }
            let frame = self
                .read_frame_until(deadline, "homing to complete")
                .map_err(|e| match e {
                    Ell7Error::Timeout { .. } => timed_out(started),
                    other => other,
                })?;

            if response_tag(&frame) == Some(POSITION_TAG) {
                let position = extract_position(&frame)?;
                self.observer.observe(MotionEvent::Homed { position });
                return Ok(position);
            }
            debug!("Skipping frame while homing: {:?}", frame);
        }
    }

    /// Read the absolute position in motor units
    pub fn get_abs(&mut self, verbose: bool) -> Result<i32> {
        self.exchange(Command::GetPosition, verbose)
    }

    /// Move to an absolute position; returns where the stage reports it ended up
    pub fn move_abs(&mut self, position: i32, verbose: bool) -> Result<i32> {
        self.exchange(Command::MoveAbsolute(position), verbose)
    }

    /// Move by a signed offset; returns the resulting absolute position
    pub fn move_rel(&mut self, offset: i32, verbose: bool) -> Result<i32> {
        self.exchange(Command::MoveRelative(offset), verbose)
    }

    /// One request/response cycle expecting a position report
    fn exchange(&mut self, command: Command, verbose: bool) -> Result<i32> {
        self.send(command)?;
        let frame = self.read_frame()?;
        let position = extract_position(&frame)?;
        if verbose {
            self.observer.observe(MotionEvent::Position { position });
        }
        Ok(position)
    }

    fn send(&mut self, command: Command) -> Result<()> {
        if self.assembler.pending() > 0 {
            warn!(
                "Discarding {} stale bytes before {:?}",
                self.assembler.pending(),
                command
            );
            self.assembler.clear();
        }

        debug!("Sending {}", command.frame());
        self.transport.write(&command.to_wire())
    }

    /// Read one terminated frame within `response_timeout`
    fn read_frame(&mut self) -> Result<String> {
        let deadline = Instant::now() + self.config.response_timeout;
        self.read_frame_until(deadline, "response")
    }

    fn read_frame_until(&mut self, deadline: Instant, awaiting: &'static str) -> Result<String> {
        let started = Instant::now();
        loop {
            if let Some(frame) = self.assembler.next_frame()? {
                debug!("Received {:?}", frame);
                return Ok(frame);
            }

            // Checked on every pass: a chatty device must not outlast the deadline
            if Instant::now() >= deadline {
                return Err(Ell7Error::Timeout {
                    waited: started.elapsed(),
                    awaiting,
                });
            }

            let bytes = self.transport.read_available()?;
            if bytes.is_empty() {
                self.sleep();
            } else {
                self.assembler.push(&bytes);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::stage::transport::scripted::ScriptedTransport;

    fn test_config() -> ControllerConfig {
        ControllerConfig {
            timeout: Duration::from_millis(1),
            poll_interval: Duration::from_millis(1),
            response_timeout: Duration::from_millis(200),
            home_timeout: Duration::from_millis(200),
        }
    }

    /// Controller homed at 0, followed by the given replies
    fn homed(replies: &[&[u8]]) -> MotionController<ScriptedTransport> {
        let mut transport = ScriptedTransport::new().then(b"0PO00000000\r\n");
        for reply in replies {
            transport.queue(reply);
        }
        MotionController::with_transport(transport, test_config()).unwrap()
    }

    #[test]
    fn test_construction_homes() {
        let controller = homed(&[]);
        assert_eq!(controller.transport().writes, vec![b"0ho0\r\n".to_vec()]);
    }

    #[test]
    fn test_home_skips_other_frames() {
        let transport = ScriptedTransport::new()
            .then(b"\r\n")
            .then_silent(3)
            .then(b"0GS09\r\n")
            .then(b"0PO000000")
            .then(b"10\r\n");
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let observer = move |event: MotionEvent| sink.lock().unwrap().push(event);

        MotionController::with_observer(transport, test_config(), Box::new(observer)).unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![MotionEvent::Homed { position: 16 }]
        );
    }

    #[test]
    fn test_home_times_out_on_silent_device() {
        let result = MotionController::with_transport(ScriptedTransport::new(), test_config());
        match result {
            Err(Ell7Error::Timeout { awaiting, waited }) => {
                assert_eq!(awaiting, "homing to complete");
                assert!(waited >= Duration::from_millis(200));
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("silent device should not home"),
        }
    }

    #[test]
    fn test_move_abs_wire_format() {
        let mut controller = homed(&[b"0PO00000064\r\n"]);
        assert_eq!(controller.move_abs(100, false).unwrap(), 100);
        assert_eq!(controller.transport().last_write(), Some(&b"0ma00000064\r\n"[..]));
    }

    #[test]
    fn test_move_rel_wire_format() {
        let mut controller = homed(&[b"0POFFFFFFFF\r\n"]);
        assert_eq!(controller.move_rel(-1, false).unwrap(), -1);
        assert_eq!(controller.transport().last_write(), Some(&b"0mrFFFFFFFF\r\n"[..]));
    }

    #[test]
    fn test_move_returns_reported_position() {
        // The stage stops short of the request; its report wins
        let mut controller = homed(&[b"0PO000003E5\r\n"]);
        assert_eq!(controller.move_abs(1000, false).unwrap(), 997);
    }

    #[test]
    fn test_get_abs_reassembles_fragments() {
        let mut controller = homed(&[b"0PO0000", b"0001\r\n"]);
        assert_eq!(controller.get_abs(false).unwrap(), 1);
        assert_eq!(controller.transport().last_write(), Some(&b"0gp\r\n"[..]));
    }

    #[test]
    fn test_get_abs_survives_empty_reads() {
        const SILENT: usize = 5;
        let mut controller = homed(&[]);
        let reads_before = controller.transport().read_calls;

        for _ in 0..SILENT {
            controller.transport.queue(b"");
        }
        controller.transport.queue(b"0POFFFFFF9C\r\n");

        assert_eq!(controller.get_abs(false).unwrap(), -100);
        assert_eq!(controller.transport().read_calls - reads_before, SILENT + 1);
    }

    #[test]
    fn test_get_abs_rejects_other_tags() {
        let mut controller = homed(&[b"0ER0000\r\n"]);
        match controller.get_abs(false) {
            Err(Ell7Error::MalformedResponse { response, .. }) => assert_eq!(response, "0ER0000"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_get_abs_times_out() {
        let mut controller = homed(&[]);
        assert!(matches!(
            controller.get_abs(false),
            Err(Ell7Error::Timeout { awaiting: "response", .. })
        ));
    }

    #[test]
    fn test_home_times_out_on_endless_status_frames() {
        let transport = ScriptedTransport::new().then_forever(b"0GS09\r\n");
        let started = Instant::now();
        let result = MotionController::with_transport(transport, test_config());

        assert!(matches!(
            result,
            Err(Ell7Error::Timeout {
                awaiting: "homing to complete",
                ..
            })
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_get_abs_fails_fast_on_status_stream() {
        // Status frames keep arriving but never a position report
        let mut controller = homed(&[]);
        controller.transport.then_forever_in_place(b"0GS09\r\n");
        let started = Instant::now();

        // The first frame arrives in time, so this fails on the tag
        assert!(matches!(
            controller.get_abs(false),
            Err(Ell7Error::MalformedResponse { .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_get_abs_rejects_endless_unterminated_stream() {
        let mut controller = homed(&[]);
        controller.transport.then_forever_in_place(b"x");
        let started = Instant::now();

        match controller.get_abs(false) {
            Err(Ell7Error::MalformedResponse { expected, .. }) => assert_eq!(expected, "terminated"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_get_abs_times_out_on_slow_drip() {
        // One byte per poll never completes a frame before the deadline
        let config = ControllerConfig {
            poll_interval: Duration::from_millis(20),
            response_timeout: Duration::from_millis(30),
            ..test_config()
        };
        let transport = ScriptedTransport::new().then(b"0PO00000000\r\n");
        let mut controller = MotionController::with_transport(transport, config).unwrap();
        for byte in b"0PO00" {
            controller.transport.queue(&[*byte]);
            controller.transport.queue(b"");
        }

        assert!(matches!(
            controller.get_abs(false),
            Err(Ell7Error::Timeout {
                awaiting: "response",
                ..
            })
        ));
    }

    #[test]
    fn test_stale_bytes_are_discarded() {
        // Homing response arrives with a trailing partial frame
        let transport = ScriptedTransport::new()
            .then(b"0PO00000000\r\n0PO1")
            .then(b"0PO00000005\r\n");
        let mut controller = MotionController::with_transport(transport, test_config()).unwrap();
        assert_eq!(controller.get_abs(false).unwrap(), 5);
    }

    #[test]
    fn test_verbose_controls_notifications() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let transport = ScriptedTransport::new()
            .then(b"0PO00000000\r\n")
            .then(b"0PO00000010\r\n")
            .then(b"0PO00000020\r\n");
        let mut controller = MotionController::with_observer(
            transport,
            test_config(),
            Box::new(move |event: MotionEvent| sink.lock().unwrap().push(event)),
        )
        .unwrap();

        controller.move_rel(16, false).unwrap();
        controller.move_rel(16, true).unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                MotionEvent::Homed { position: 0 },
                MotionEvent::Position { position: 32 },
            ]
        );
    }
}
