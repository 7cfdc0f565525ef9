//! Recording consumers.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};

use pdumux::{CopyError, FireAndForgetConsumer, ReceptionOutcome, Refused, RxPdu, StreamingConsumer};

/// A consumer callback observed by [`RecordingConsumer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Start { pdu: RxPdu, len: usize },
    Copy { pdu: RxPdu, bytes: Vec<u8> },
    Complete { pdu: RxPdu, outcome: ReceptionOutcome },
    Deliver { pdu: RxPdu, payload: Vec<u8> },
}

/// Consumer implementing both contracts and recording every call.
///
/// Replies come from scripted queues first. Once those are empty the
/// consumer models a buffer: with a budget set it reports the budget as free
/// space and shrinks it with every copy, otherwise it accepts everything.
#[derive(Debug, Default)]
pub struct RecordingConsumer {
    events: Mutex<Vec<Event>>,
    starts: Mutex<VecDeque<Result<usize, Refused>>>,
    copies: Mutex<VecDeque<Result<usize, CopyError>>>,
    budget: Mutex<Option<usize>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

impl RecordingConsumer {
    /// Consumer with `budget` bytes of buffer space.
    #[must_use]
    pub fn with_budget(budget: usize) -> Self {
        Self {
            budget: Mutex::new(Some(budget)),
            ..Self::default()
        }
    }

    /// Free `bytes` of buffer space, as if the upper layer consumed them.
    pub fn grant(&self, bytes: usize) {
        let mut budget = lock(&self.budget);
        *budget = Some(budget.unwrap_or(0).saturating_add(bytes));
    }

    /// Remove any budget limit.
    pub fn unlimit(&self) { *lock(&self.budget) = None; }

    /// Queue replies for upcoming `start_reception` calls.
    pub fn script_starts(&self, replies: impl IntoIterator<Item = Result<usize, Refused>>) {
        lock(&self.starts).extend(replies);
    }

    /// Queue replies for upcoming `copy_data` calls, queries included.
    pub fn script_copies(&self, replies: impl IntoIterator<Item = Result<usize, CopyError>>) {
        lock(&self.copies).extend(replies);
    }

    #[must_use]
    pub fn events(&self) -> Vec<Event> { lock(&self.events).clone() }

    pub fn clear(&self) { lock(&self.events).clear(); }

    /// PDUs received completely, in completion order, as `(pdu_id, payload)`.
    #[must_use]
    pub fn completed(&self) -> Vec<(u32, Vec<u8>)> {
        let mut open: HashMap<u32, Vec<u8>> = HashMap::new();
        let mut done = Vec::new();
        for event in lock(&self.events).iter() {
            match event {
                Event::Start { pdu, .. } => {
                    open.insert(pdu.pdu_id, Vec::new());
                }
                Event::Copy { pdu, bytes } => open.entry(pdu.pdu_id).or_default().extend(bytes),
                Event::Complete { pdu, outcome } => {
                    let payload = open.remove(&pdu.pdu_id).unwrap_or_default();
                    if *outcome == ReceptionOutcome::Ok {
                        done.push((pdu.pdu_id, payload));
                    }
                }
                Event::Deliver { pdu, payload } => done.push((pdu.pdu_id, payload.clone())),
            }
        }
        done
    }

    /// Completion outcomes reported to the streaming contract.
    #[must_use]
    pub fn outcomes(&self) -> Vec<(u32, ReceptionOutcome)> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                Event::Complete { pdu, outcome } => Some((pdu.pdu_id, *outcome)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) { lock(&self.events).push(event); }
}

impl StreamingConsumer for RecordingConsumer {
    fn start_reception(&self, pdu: RxPdu, declared_len: usize) -> Result<usize, Refused> {
        self.push(Event::Start {
            pdu,
            len: declared_len,
        });
        lock(&self.starts)
            .pop_front()
            .unwrap_or_else(|| Ok(lock(&self.budget).unwrap_or(usize::MAX)))
    }

    fn copy_data(&self, pdu: RxPdu, chunk: &[u8]) -> Result<usize, CopyError> {
        let scripted = lock(&self.copies).pop_front();
        let reply = scripted.unwrap_or_else(|| {
            let mut budget = lock(&self.budget);
            match *budget {
                None => Ok(usize::MAX),
                Some(free) if chunk.len() > free => Err(CopyError::Busy),
                Some(free) => {
                    *budget = Some(free - chunk.len());
                    Ok(free - chunk.len())
                }
            }
        });
        if reply.is_ok() && !chunk.is_empty() {
            self.push(Event::Copy {
                pdu,
                bytes: chunk.to_vec(),
            });
        }
        reply
    }

    fn reception_complete(&self, pdu: RxPdu, outcome: ReceptionOutcome) { self.push(Event::Complete { pdu, outcome }); }
}

impl FireAndForgetConsumer for RecordingConsumer {
    fn deliver(&self, pdu: RxPdu, payload: &[u8]) {
        self.push(Event::Deliver {
            pdu,
            payload: payload.to_vec(),
        });
    }
}
