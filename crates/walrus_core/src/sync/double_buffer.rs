//! # Double-Buffered Frame Handoff
//!
//! Ownership-passing handshake between a submitting thread and a render
//! thread.
//!
//! ## Architecture
//!
//! ```text
//!   Submit thread                                Render thread
//!  ┌──────────────┐      to_render (cap 1)      ┌──────────────┐
//!  │ FrameProducer│ ──────── frame N ─────────▶ │ FrameConsumer│
//!  │              │                             │              │
//!  │  builds N+1  │ ◀─────── frame N-1 ──────── │  executes N  │
//!  └──────────────┘      to_submit (cap 1)      └──────────────┘
//! ```
//!
//! Exactly two frames exist. The submit side always owns one of them, the
//! other is either in flight or waiting to be handed back. Because the
//! producer must receive a frame back before it can send the next one,
//! frame N+2 can never start before the render thread has drained frame N.
//!
//! No locks guard the frame contents; whoever holds a frame owns it.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

/// Creates a connected producer/consumer pair.
///
/// `spare` is the second frame. It is handed to the first
/// [`FrameProducer::wait_render`] call as if the render thread had just
/// finished with it.
#[must_use]
pub fn frame_channel<T>(spare: T) -> (FrameProducer<T>, FrameConsumer<T>) {
    let (to_render_tx, to_render_rx) = bounded(1);
    let (to_submit_tx, to_submit_rx) = bounded(1);

    let producer = FrameProducer {
        to_render: to_render_tx,
        from_render: to_submit_rx,
        spare: Some(spare),
        frames_sent: 0,
        frames_returned: 0,
    };
    let consumer = FrameConsumer {
        from_submit: to_render_rx,
        to_submit: to_submit_tx,
    };

    (producer, consumer)
}

/// The render side hung up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

impl std::fmt::Display for Disconnected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("frame channel disconnected")
    }
}

impl std::error::Error for Disconnected {}

/// Submit-thread end of the handoff.
#[derive(Debug)]
pub struct FrameProducer<T> {
    to_render: Sender<T>,
    from_render: Receiver<T>,
    /// Frame that has not been through the render thread yet.
    spare: Option<T>,
    frames_sent: u64,
    frames_returned: u64,
}

impl<T> FrameProducer<T> {
    /// Blocks until the render thread hands a frame back.
    ///
    /// Returns the spare frame immediately on the first call.
    pub fn wait_render(&mut self) -> Result<T, Disconnected> {
        if let Some(frame) = self.spare.take() {
            return Ok(frame);
        }
        let frame = self.from_render.recv().map_err(|_| Disconnected)?;
        self.frames_returned += 1;
        Ok(frame)
    }

    /// Like [`wait_render`](Self::wait_render) but gives up after `timeout`.
    ///
    /// Returns `Ok(None)` on timeout.
    pub fn wait_render_timeout(&mut self, timeout: Duration) -> Result<Option<T>, Disconnected> {
        if let Some(frame) = self.spare.take() {
            return Ok(Some(frame));
        }
        match self.from_render.recv_timeout(timeout) {
            Ok(frame) => {
                self.frames_returned += 1;
                Ok(Some(frame))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Disconnected),
        }
    }

    /// Hands a sealed frame to the render thread.
    pub fn submit(&mut self, frame: T) -> Result<(), Disconnected> {
        self.to_render.send(frame).map_err(|_| Disconnected)?;
        self.frames_sent += 1;
        Ok(())
    }

    /// Returns true while a submitted frame is with the render thread or
    /// waiting to be collected.
    #[inline]
    #[must_use]
    pub const fn in_flight(&self) -> bool {
        self.frames_sent > self.frames_returned
    }

    /// Returns the number of frames handed to the render thread.
    #[inline]
    #[must_use]
    pub const fn frames_sent(&self) -> u64 {
        self.frames_sent
    }
}

/// Render-thread end of the handoff.
#[derive(Debug)]
pub struct FrameConsumer<T> {
    from_submit: Receiver<T>,
    to_submit: Sender<T>,
}

impl<T> FrameConsumer<T> {
    /// Blocks until the submit thread sends a frame.
    ///
    /// Returns `None` once the producer has been dropped, which is the
    /// render thread's signal to exit.
    pub fn wait_submit(&self) -> Option<T> {
        self.from_submit.recv().ok()
    }

    /// Hands an executed frame back to the submit thread.
    pub fn finish(&self, frame: T) -> Result<(), Disconnected> {
        self.to_submit.send(frame).map_err(|_| Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_spare_is_returned_first() {
        let (mut producer, _consumer) = frame_channel(7u32);
        assert_eq!(producer.wait_render().unwrap(), 7);
        assert!(!producer.in_flight());
    }

    #[test]
    fn test_in_flight_tracks_outstanding_frame() {
        let (mut producer, consumer) = frame_channel(1u32);
        let spare = producer.wait_render().unwrap();
        producer.submit(0).unwrap();
        assert!(producer.in_flight());

        let frame = consumer.wait_submit().unwrap();
        consumer.finish(frame).unwrap();
        // Handed back but not yet collected.
        assert!(producer.in_flight());
        assert_eq!(producer.wait_render().unwrap(), 0);
        assert!(!producer.in_flight());

        producer.submit(spare).unwrap();
        assert!(producer.in_flight());
        let frame = consumer.wait_submit().unwrap();
        consumer.finish(frame).unwrap();
        let back = producer.wait_render_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(back, Some(1));
        assert!(!producer.in_flight());
    }

    #[test]
    fn test_timeout_when_render_is_busy() {
        let (mut producer, _consumer) = frame_channel(0u32);
        let _ = producer.wait_render().unwrap();
        let waited = producer
            .wait_render_timeout(Duration::from_millis(5))
            .unwrap();
        assert!(waited.is_none());
    }

    #[test]
    fn test_consumer_exits_when_producer_dropped() {
        let (producer, consumer) = frame_channel(0u32);
        drop(producer);
        assert!(consumer.wait_submit().is_none());
    }

    #[test]
    fn test_ping_pong_never_runs_ahead() {
        let (mut producer, consumer) = frame_channel(Vec::<u32>::new());
        let executed = Arc::new(AtomicUsize::new(0));
        let executed_render = Arc::clone(&executed);

        let render = thread::spawn(move || {
            while let Some(mut frame) = consumer.wait_submit() {
                thread::sleep(Duration::from_millis(2));
                frame.clear();
                executed_render.fetch_add(1, Ordering::SeqCst);
                if consumer.finish(frame).is_err() {
                    break;
                }
            }
        });

        let mut current = vec![0u32];
        for n in 1..=10usize {
            let next = producer.wait_render().unwrap();
            // Every frame before n-1 has been handed back.
            assert!(executed.load(Ordering::SeqCst) >= n - 1);
            let sealed = std::mem::replace(&mut current, next);
            producer.submit(sealed).unwrap();
            current.push(n as u32);
        }

        drop(producer);
        render.join().unwrap();
        assert_eq!(executed.load(Ordering::SeqCst), 10);
    }
}
