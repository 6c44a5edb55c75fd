//! Fan-out of committed events to live sessions.

use std::collections::HashMap;

use tracing::trace;

use crate::{
  event::{Recipients, Routed},
  registry::SessionRegistry,
};

impl<E: Routed> SessionRegistry<E> {
  /// Offer `event` to every live session it is addressed to.
  ///
  /// Returns the number of queues that accepted it. Queues are unbounded, so
  /// this never waits on a consumer; a queue whose receiver is already gone
  /// is skipped. Offers happen under the membership lock, so two publishes
  /// reach every shared queue in the same relative order.
  pub fn publish(&self, event: &E) -> usize {
    let members = self.members();

    let mut targets = HashMap::new();
    match event.recipients() {
      Recipients::Pair(a, b) => {
        for identity in [a, b] {
          if let Some(sessions) = members.by_identity.get(&identity) {
            targets.extend(sessions.iter());
          }
        }
      }
      Recipients::Everyone => {
        for sessions in members.by_identity.values() {
          targets.extend(sessions.iter());
        }
      }
    }

    let mut delivered = 0;
    for (session, queue) in targets {
      if queue.send(event.clone()).is_ok() {
        delivered += 1;
      } else {
        trace!(%session, "session queue closed before delivery");
      }
    }

    trace!(delivered, "event published");
    delivered
  }
}
