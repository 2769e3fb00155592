use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use super::track::Track;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Track>,
    current: Option<Track>,
    is_playing: bool,
}

/// Pending tracks plus the "current track" slot.
///
/// Every operation takes the same lock for a short, non-suspending critical
/// section, so the command layer and the playback loop can touch the queue
/// concurrently and always observe some serialization of the mutations.
#[derive(Debug, Default)]
pub struct TrackQueue {
    state: Mutex<QueueState>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un track al final de la cola.
    pub fn enqueue(&self, track: Track) {
        info!("➕ Agregado a la cola: {}", track.title);
        self.state.lock().pending.push_back(track);
    }

    /// Inserts ahead of every pending track (never ahead of the current one).
    pub fn enqueue_front(&self, track: Track) {
        info!("⏫ Agregado al frente de la cola: {}", track.title);
        self.state.lock().pending.push_front(track);
    }

    /// Appends a batch in order. Returns how many were added.
    pub fn enqueue_all(&self, tracks: Vec<Track>) -> usize {
        let added = tracks.len();
        self.state.lock().pending.extend(tracks);
        info!("➕ Agregadas {} canciones a la cola", added);
        added
    }

    /// Sets the playing flag and returns its previous value.
    ///
    /// Exactly one of several concurrent callers sees `false`, and that one
    /// is responsible for starting playback.
    pub fn claim_playback(&self) -> bool {
        std::mem::replace(&mut self.state.lock().is_playing, true)
    }

    /// Pops the head and makes it the current track. An empty queue clears
    /// the current slot and returns `None`.
    pub fn dequeue_next(&self) -> Option<Track> {
        let mut state = self.state.lock();
        let next = state.pending.pop_front();
        state.current = next.clone();
        if let Some(track) = &next {
            debug!("➡️ Siguiente en cola: {}", track.title);
        }
        next
    }

    /// Clears the current track and the playing flag; pending is untouched.
    pub fn skip_current(&self) -> Option<Track> {
        let mut state = self.state.lock();
        state.is_playing = false;
        state.current.take()
    }

    /// Empties the pending sequence. Returns how many tracks were dropped.
    pub fn clear_pending(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.pending.len();
        state.pending.clear();
        info!("🗑️ Cola limpiada ({} canciones)", dropped);
        dropped
    }

    /// Fisher-Yates over the pending sequence.
    pub fn shuffle(&self) {
        let mut state = self.state.lock();
        if state.pending.len() <= 1 {
            return;
        }
        let mut rng = rand::thread_rng();
        state.pending.make_contiguous().shuffle(&mut rng);
        info!("🔀 Cola mezclada ({} canciones)", state.pending.len());
    }

    /// Copy of the pending sequence, safe to iterate without the lock.
    pub fn snapshot(&self) -> Vec<Track> {
        self.state.lock().pending.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    pub fn current(&self) -> Option<Track> {
        self.state.lock().current.clone()
    }

    pub fn set_current(&self, track: Option<Track>) {
        self.state.lock().current = track;
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().is_playing
    }

    pub fn set_playing(&self, playing: bool) {
        self.state.lock().is_playing = playing;
    }

    /// Marks the queue idle, but only if nothing is pending.
    ///
    /// Returns `false` when a track slipped in since the last dequeue, in
    /// which case the caller should loop again instead of going idle.
    pub fn finish_if_empty(&self) -> bool {
        let mut state = self.state.lock();
        if !state.pending.is_empty() {
            return false;
        }
        state.current = None;
        state.is_playing = false;
        true
    }

    /// Total runtime of the pending tracks.
    pub fn total_duration(&self) -> Duration {
        self.state.lock().pending.iter().map(|t| t.duration).sum()
    }
}
