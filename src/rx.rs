//! Receive FIFOs and the software receive queue.
//!
//! The receive interrupt is the only producer and the foreground the only consumer of the queue.
//! Both ends are lock-free; the loss counters are each written by the interrupt alone, except when
//! the foreground resets them with the receive lines masked.

use core::sync::atomic::{AtomicU32, Ordering};

use heapless::spsc::{Consumer, Producer, Queue};

use crate::frame::MailboxImage;
use crate::pac::{rfr, Reg, Registers};
use crate::{Fifo, Frame};

/// Depth of each hardware receive FIFO.
const FIFO_DEPTH: usize = 3;

/// Storage for received frames, shared by the receive interrupt and the foreground.
///
/// Holds up to `N - 1` frames. Create it in a `static` (or any place that outlives the controller)
/// and pass it to [`Can::new`](crate::Can::new).
pub struct RxQueue<const N: usize> {
    frames: Queue<Frame, N>,
    lost: AtomicU32,
    overruns: AtomicU32,
}

impl<const N: usize> RxQueue<N> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            frames: Queue::new(),
            lost: AtomicU32::new(0),
            overruns: AtomicU32::new(0),
        }
    }

    /// Number of frames the queue can hold.
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    pub(crate) fn split(&mut self) -> (RxProducer<'_, N>, RxConsumer<'_, N>) {
        let (producer, consumer) = self.frames.split();
        (
            RxProducer {
                frames: producer,
                lost: &self.lost,
                overruns: &self.overruns,
            },
            RxConsumer {
                frames: consumer,
                lost: &self.lost,
                overruns: &self.overruns,
            },
        )
    }
}

impl<const N: usize> Default for RxQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Interrupt end of the receive queue.
pub(crate) struct RxProducer<'a, const N: usize> {
    frames: Producer<'a, Frame, N>,
    lost: &'a AtomicU32,
    overruns: &'a AtomicU32,
}

impl<const N: usize> RxProducer<'_, N> {
    /// Queues `frame`, or counts it as lost if the queue is full.
    fn push(&mut self, frame: Frame) {
        if self.frames.enqueue(frame).is_err() {
            // Only this end increments, so a load/store pair does not race.
            let lost = self.lost.load(Ordering::Relaxed).wrapping_add(1);
            self.lost.store(lost, Ordering::Relaxed);
            warn!("receive queue full, {} frames lost", lost);
        }
    }

    fn note_overrun(&mut self, fifo: Fifo) {
        let overruns = self.overruns.load(Ordering::Relaxed).wrapping_add(1);
        self.overruns.store(overruns, Ordering::Relaxed);
        warn!("{} overrun", fifo);
    }
}

/// Foreground end of the receive queue.
pub(crate) struct RxConsumer<'a, const N: usize> {
    frames: Consumer<'a, Frame, N>,
    lost: &'a AtomicU32,
    overruns: &'a AtomicU32,
}

impl<const N: usize> RxConsumer<'_, N> {
    pub(crate) fn available(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn peek(&self) -> Option<&Frame> {
        self.frames.peek()
    }

    pub(crate) fn pop(&mut self) -> Option<Frame> {
        self.frames.dequeue()
    }

    pub(crate) fn lost(&self) -> u32 {
        self.lost.load(Ordering::Relaxed)
    }

    pub(crate) fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Discards all queued frames and resets the loss counters.
    ///
    /// The caller must keep the receive interrupt from running for the duration.
    pub(crate) fn clear(&mut self) {
        while self.frames.dequeue().is_some() {}
        self.lost.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
    }
}

/// Moves the frames pending in `fifo` into the receive queue.
///
/// Every slot read is released, whether or not the queue had room for its frame. At most one
/// FIFO's worth of frames is moved per call: frames arriving meanwhile keep the interrupt pending.
/// Returns the number of slots released.
pub(crate) fn drain<R: Registers, const N: usize>(
    regs: &R,
    fifo: Fifo,
    queue: &mut RxProducer<'_, N>,
) -> usize {
    let mut released = 0;

    while released < FIFO_DEPTH {
        let status = regs.read(Reg::Rfr(fifo));
        if status & rfr::FMP_MASK == 0 {
            break;
        }

        if status & rfr::FOVR != 0 {
            regs.write(Reg::Rfr(fifo), rfr::FOVR);
            queue.note_overrun(fifo);
        }

        let image = MailboxImage {
            id: regs.read(Reg::Rir(fifo)),
            dlc_time: regs.read(Reg::Rdtr(fifo)),
            data_low: regs.read(Reg::Rdlr(fifo)),
            data_high: regs.read(Reg::Rdhr(fifo)),
        };
        queue.push(image.decode());

        regs.write(Reg::Rfr(fifo), rfr::RFOM);
        released += 1;
    }

    released
}
