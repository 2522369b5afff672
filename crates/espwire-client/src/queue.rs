use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::request::{lock, Request, ResponseHandler};

/// FIFO of requests waiting for the writer, with head insertion.
#[derive(Debug, Default)]
pub(crate) struct RequestQueue {
    pending: Mutex<VecDeque<Request>>,
    available: Notify,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, request: Request, send_next: bool) {
        {
            let mut pending = lock(&self.pending);
            if send_next {
                pending.push_front(request);
            } else {
                pending.push_back(request);
            }
        }
        self.available.notify_one();
    }

    pub fn pop(&self) -> Option<Request> {
        lock(&self.pending).pop_front()
    }

    /// Wait for the next request.
    pub async fn next(&self) -> Request {
        loop {
            if let Some(request) = self.pop() {
                return request;
            }
            self.available.notified().await;
        }
    }

    /// Take the first request addressed to its own origin.
    pub fn take_self_addressed(&self) -> Option<Request> {
        let mut pending = lock(&self.pending);
        let index = pending
            .iter()
            .position(|r| r.frame().is_self_addressed())?;
        pending.remove(index)
    }

    /// Remove every queued request bound to `handler`.
    pub fn remove_with_handler(&self, handler: &Arc<ResponseHandler>) -> usize {
        let mut pending = lock(&self.pending);
        let before = pending.len();
        pending.retain(|r| !r.shares_handler(handler));
        before - pending.len()
    }

    /// Run `f` with exclusive access to the queued requests.
    pub fn with_pending<R>(&self, f: impl FnOnce(&mut VecDeque<Request>) -> R) -> R {
        f(&mut lock(&self.pending))
    }

    pub fn clear(&self) -> Vec<Request> {
        lock(&self.pending).drain(..).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use espwire_frame::{request, DeviceId};

    #[tokio::test]
    async fn fifo_with_head_insert() {
        let queue = RequestQueue::new();
        queue.push(Request::new(request::current_volume()), false);
        queue.push(Request::new(request::all_volume()), false);
        queue.push(Request::new(request::battery_voltage()), true);

        assert_eq!(queue.next().await.kind(), request::battery_voltage().kind());
        assert_eq!(queue.next().await.kind(), request::current_volume().kind());
        assert_eq!(queue.next().await.kind(), request::all_volume().kind());
        assert!(queue.pop().is_none());
    }

    #[tokio::test]
    async fn next_wakes_on_push() {
        let queue = Arc::new(RequestQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next().await.kind() })
        };
        tokio::task::yield_now().await;
        queue.push(Request::new(request::savvy_status()), false);
        assert_eq!(waiter.await.unwrap(), request::savvy_status().kind());
    }

    #[test]
    fn self_addressed_requests_are_found_anywhere() {
        let queue = RequestQueue::new();
        queue.push(Request::new(request::current_volume()), false);
        queue.push(Request::new(request::version(DeviceId::V1Connection)), false);
        let found = queue.take_self_addressed().unwrap();
        assert!(found.frame().is_self_addressed());
        assert_eq!(queue.len(), 1);
        assert!(queue.take_self_addressed().is_none());
    }

    #[test]
    fn removes_requests_sharing_a_handler() {
        let queue = RequestQueue::new();
        let handler = ResponseHandler::new().shared();
        queue.push(
            Request::new(request::current_volume()).with_handler(Arc::clone(&handler)),
            false,
        );
        queue.push(Request::new(request::all_volume()), false);
        queue.push(
            Request::new(request::battery_voltage()).with_handler(Arc::clone(&handler)),
            false,
        );
        assert_eq!(queue.remove_with_handler(&handler), 2);
        assert_eq!(queue.len(), 1);
    }
}
