//! Channel implementations.
//!
//! Every queue between components follows a ready/valid style handshake:
//! the producer calls `send`, the consumer polls `try_recv`. Each
//! demultiplexed branch gets its own channel, so a stalled consumer only
//! backpressures its own producer.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub type SendError<T> = crossbeam::channel::SendError<T>;
pub type TryRecvError = crossbeam::channel::TryRecvError;

/// The sending end of a channel.
#[derive(Debug)]
pub struct Sender<T> {
    flavor: SenderFlavor<T>,
}

#[derive(Debug)]
enum SenderFlavor<T> {
    /// Crossbeam MPMC channel.
    Concurrent(crossbeam::channel::Sender<T>),
    /// Sequential single-threaded queue. Not concurrent safe. Must be used with special
    /// scheduling policy.
    Sequential(SequentialSender<T>),
}

macro_rules! choose_sender_flavor {
    ($flavor:expr, $func:ident $(, $args:tt)*) => {
        match $flavor {
            SenderFlavor::Concurrent(c) => c.$func($($args)*),
            SenderFlavor::Sequential(c) => c.$func($($args)*),
        }
    };
}

impl<T> Sender<T> {
    #[inline]
    pub fn send(&mut self, t: T) -> Result<(), SendError<T>> {
        choose_sender_flavor!(&mut self.flavor, send, t)
    }
}

/// The receiving end of a channel.
#[derive(Debug)]
pub struct Receiver<T> {
    flavor: ReceiverFlavor<T>,
}

#[derive(Debug)]
enum ReceiverFlavor<T> {
    /// Crossbeam MPMC channel.
    Concurrent(crossbeam::channel::Receiver<T>),
    /// Sequential single-threaded queue. Not concurrent safe. Must be used with special
    /// scheduling policy.
    Sequential(SequentialReceiver<T>),
}

macro_rules! choose_receiver_flavor {
    ($flavor:expr, $func:ident $(, $args:tt)*) => {
        match $flavor {
            ReceiverFlavor::Concurrent(c) => c.$func($($args)*),
            ReceiverFlavor::Sequential(c) => c.$func($($args)*),
        }
    };
}

impl<T> Receiver<T> {
    #[inline]
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        choose_receiver_flavor!(&mut self.flavor, try_recv)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        choose_receiver_flavor!(&self.flavor, is_empty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelFlavor {
    Concurrent,
    Sequential,
}

pub fn create_channel<T>(flavor: ChannelFlavor) -> (Sender<T>, Receiver<T>) {
    match flavor {
        ChannelFlavor::Concurrent => {
            let (sender, receiver) = crossbeam::channel::unbounded();
            (
                Sender {
                    flavor: SenderFlavor::Concurrent(sender),
                },
                Receiver {
                    flavor: ReceiverFlavor::Concurrent(receiver),
                },
            )
        }
        ChannelFlavor::Sequential => {
            let (sender, receiver) = create_sequential_channel();
            (
                Sender {
                    flavor: SenderFlavor::Sequential(sender),
                },
                Receiver {
                    flavor: ReceiverFlavor::Sequential(receiver),
                },
            )
        }
    }
}

#[derive(Debug)]
struct SequentialSender<T> {
    shared: Rc<Shared<T>>,
}

// Rc is not safe to send. However, we (the developers) make sure when sending the Channel
// to another thread, all of this references (Senders, Receivers) will be moving to the
// same thread.
unsafe impl<T: Send> Send for SequentialSender<T> {}

#[derive(Debug)]
struct SequentialReceiver<T> {
    shared: Rc<Shared<T>>,
}

// Rc is not safe to send. However, we (the developers) make sure when sending the Channel
// to another thread, all of this references (Senders, Receivers) will be moving to the
// same thread.
unsafe impl<T: Send> Send for SequentialReceiver<T> {}

#[derive(Debug)]
struct Shared<T> {
    inner: RefCell<VecDeque<T>>,
}

impl<T> SequentialSender<T> {
    fn send(&mut self, t: T) -> Result<(), SendError<T>> {
        if Rc::strong_count(&self.shared) == 1 {
            return Err(crossbeam::channel::SendError(t));
        }
        let mut inner = self.shared.inner.borrow_mut();
        inner.push_back(t);
        drop(inner);
        Ok(())
    }
}

impl<T> SequentialReceiver<T> {
    fn try_recv(&mut self) -> Result<T, TryRecvError> {
        // Messages sent before the last sender hung up stay receivable,
        // same as the crossbeam flavor.
        let mut inner = self.shared.inner.borrow_mut();
        if let Some(t) = inner.pop_front() {
            return Ok(t);
        }
        drop(inner);
        if Rc::strong_count(&self.shared) == 1 {
            Err(TryRecvError::Disconnected)
        } else {
            Err(TryRecvError::Empty)
        }
    }

    fn is_empty(&self) -> bool {
        let inner = self.shared.inner.borrow_mut();
        inner.is_empty()
    }
}

fn create_sequential_channel<T>() -> (SequentialSender<T>, SequentialReceiver<T>) {
    let shared = Rc::new(Shared {
        inner: RefCell::new(VecDeque::new()),
    });
    (
        SequentialSender {
            shared: shared.clone(),
        },
        SequentialReceiver { shared },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_pong() {
        let (mut tx, mut rx) = create_channel(ChannelFlavor::Sequential);
        assert_eq!(tx.send(42), Ok(()));
        assert_eq!(rx.try_recv(), Ok(42));
    }

    #[test]
    fn closed_tx() {
        let (tx, mut rx) = create_channel::<()>(ChannelFlavor::Sequential);
        drop(tx);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn closed_tx_drains_queued_items_first() {
        let (mut tx, mut rx) = create_channel(ChannelFlavor::Sequential);
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        drop(tx);
        assert_eq!(rx.try_recv(), Ok(1));
        assert_eq!(rx.try_recv(), Ok(2));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn closed_rx() {
        let (mut tx, rx) = create_channel(ChannelFlavor::Sequential);
        drop(rx);
        assert_eq!(tx.send(42), Err(crossbeam::channel::SendError(42)));
    }

    #[test]
    fn concurrent_fifo() {
        let (mut tx, mut rx) = create_channel(ChannelFlavor::Concurrent);
        for i in 0..8 {
            tx.send(i).unwrap();
        }
        for i in 0..8 {
            assert_eq!(rx.try_recv(), Ok(i));
        }
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }
}
