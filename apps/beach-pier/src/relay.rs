//! Pairing and relay of negotiation messages between browsers and workers.
//!
//! Every handler takes the single state lock for its whole
//! read-decide-mutate-send step. Offer and candidate broadcasts depend on
//! which workers are free across all connection ids, so the lock cannot be
//! split per id.

use std::collections::HashSet;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::pairs::{Pair, PairTable};
use crate::registry::{RoleSet, SessionHandle, SessionId, SessionRegistry};
use crate::signaling::{
    Answer, Candidate, CandidatePayload, ClientMessage, Offer, SdpPayload, ServerMessage,
};

/// What a handler did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Connect accepted. `opened` is true when it created the pair.
    Connected { polite: bool, opened: bool },
    /// Connect refused because the pair is already complete.
    Rejected,
    /// Sent to the other side of the pair.
    Delivered,
    /// No other side yet; fanned out to free workers.
    Broadcast { recipients: usize },
    /// No pair, or no one left to deliver to.
    Dropped,
    Disconnected,
    Ignored,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Connected { opened: true, .. } => "opened",
            Outcome::Connected { polite: true, .. } => "joined",
            Outcome::Connected { .. } => "reconnected",
            Outcome::Rejected => "rejected",
            Outcome::Delivered => "delivered",
            Outcome::Broadcast { .. } => "broadcast",
            Outcome::Dropped => "dropped",
            Outcome::Disconnected => "disconnected",
            Outcome::Ignored => "ignored",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RelayStats {
    pub sessions: usize,
    pub browsers: usize,
    pub workers: usize,
    pub free_workers: usize,
    pub open_pairs: usize,
    pub complete_pairs: usize,
}

#[derive(Default)]
struct RelayState {
    sessions: SessionRegistry,
    pairs: PairTable,
    roles: RoleSet,
}

impl RelayState {
    /// Workers not sitting in any complete pair.
    fn free_workers(&self) -> Vec<SessionId> {
        let paired: HashSet<SessionId> = self.pairs.paired_sessions().collect();
        self.sessions
            .ids()
            .filter(|id| !self.roles.is_browser(*id) && !paired.contains(id))
            .collect()
    }

    /// Deliver to the opposite slot, or to every free worker when it is empty.
    fn route(&self, from: SessionId, pair: Pair, message: ServerMessage) -> Outcome {
        if let Some(other) = pair.other(from) {
            self.sessions.send(other, message);
            return Outcome::Delivered;
        }

        let targets = self.free_workers();
        for target in &targets {
            self.sessions.send(*target, message.clone());
        }
        Outcome::Broadcast {
            recipients: targets.len(),
        }
    }
}

/// Shared relay state handed to the transport at startup.
#[derive(Default)]
pub struct Relay {
    state: Mutex<RelayState>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted session with no connection ids.
    pub fn add_session(&self, handle: SessionHandle) {
        let mut state = self.state.lock();
        debug!(session = %handle.id, "session added");
        state.sessions.add(handle);

        counter!("beach_pier_sessions_opened_total", 1);
        gauge!("beach_pier_active_sessions", state.sessions.len() as f64);
    }

    /// Forget a closed session and tell the other side of every pair it sat in.
    pub fn remove_session(&self, session: SessionId) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(owned) = state.sessions.remove(session) else {
            return;
        };
        state.roles.forget(session);

        for connection_id in owned {
            let Some(pair) = state.pairs.remove(&connection_id) else {
                continue;
            };
            if let Some(other) = pair.other(session) {
                state
                    .sessions
                    .send(other, ServerMessage::disconnect(&connection_id));
            }
            info!(%session, %connection_id, "pair closed with session");
        }

        counter!("beach_pier_sessions_closed_total", 1);
        gauge!("beach_pier_active_sessions", state.sessions.len() as f64);
    }

    /// Route one decoded event from `session`.
    pub fn handle(&self, session: SessionId, message: ClientMessage) -> Outcome {
        let kind = message.kind();
        let outcome = match message {
            ClientMessage::Connect { connection_id } => self.connect(session, &connection_id),
            ClientMessage::Disconnect { connection_id } => {
                self.disconnect(session, &connection_id)
            }
            ClientMessage::Offer { data } => self.offer(session, data),
            ClientMessage::Answer { data } => self.answer(session, data),
            ClientMessage::Candidate { data } => self.candidate(session, data),
            ClientMessage::Unknown => {
                debug!(%session, "ignoring unknown event type");
                Outcome::Ignored
            }
        };

        counter!(
            "beach_pier_events_total",
            1,
            "event" => kind,
            "outcome" => outcome.label()
        );
        outcome
    }

    pub fn connect(&self, session: SessionId, connection_id: &str) -> Outcome {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        state.roles.mark_browser(session);

        let (polite, opened) = match state.pairs.get(connection_id) {
            None => {
                state.pairs.set(connection_id, Pair::open(session));
                (false, true)
            }
            Some(pair) if pair.is_complete() => {
                warn!(%session, %connection_id, "connection id already paired");
                state
                    .sessions
                    .send(session, ServerMessage::already_used(connection_id));
                return Outcome::Rejected;
            }
            // Repeated connect from the sole occupant keeps its original role.
            Some(pair) if pair.contains(session) => (pair.slots()[0] != Some(session), false),
            Some(mut pair) => {
                pair.fill(session);
                state.pairs.set(connection_id, pair);
                (true, false)
            }
        };

        state.sessions.claim(session, connection_id);
        state.sessions.send(
            session,
            ServerMessage::Connect {
                connection_id: connection_id.to_string(),
                polite,
            },
        );
        info!(%session, %connection_id, polite, "browser connected");
        Outcome::Connected { polite, opened }
    }

    pub fn disconnect(&self, session: SessionId, connection_id: &str) -> Outcome {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        state.sessions.release(session, connection_id);
        if let Some(other) = state
            .pairs
            .remove(connection_id)
            .and_then(|pair| pair.other(session))
        {
            state
                .sessions
                .send(other, ServerMessage::disconnect(connection_id));
        }
        state
            .sessions
            .send(session, ServerMessage::disconnect(connection_id));

        info!(%session, %connection_id, "disconnected");
        Outcome::Disconnected
    }

    pub fn offer(&self, session: SessionId, payload: SdpPayload) -> Outcome {
        let SdpPayload { connection_id, sdp } = payload;
        let mut offer = Offer::new(sdp);

        let state = self.state.lock();
        let Some(pair) = state.pairs.get(&connection_id) else {
            debug!(%session, %connection_id, "offer for unknown connection id dropped");
            return Outcome::Dropped;
        };

        offer.polite = true;
        let outcome = state.route(session, pair, ServerMessage::offer(&connection_id, offer));
        debug!(%session, %connection_id, ?outcome, "offer relayed");
        outcome
    }

    pub fn answer(&self, session: SessionId, payload: SdpPayload) -> Outcome {
        let SdpPayload { connection_id, sdp } = payload;
        let answer = Answer::new(sdp);

        let mut guard = self.state.lock();
        let state = &mut *guard;

        // Workers that picked up a broadcast offer never sent connect.
        state.sessions.claim(session, &connection_id);

        let Some(pair) = state.pairs.get(&connection_id) else {
            debug!(%session, %connection_id, "answer for unknown connection id dropped");
            return Outcome::Dropped;
        };

        let other = pair.other(session);
        state
            .pairs
            .set(&connection_id, Pair::new(other, Some(session)));

        match other {
            Some(other) => {
                state
                    .sessions
                    .send(other, ServerMessage::answer(&connection_id, answer));
                info!(%session, %connection_id, peer = %other, "worker paired by answer");
                Outcome::Delivered
            }
            None => {
                debug!(%session, %connection_id, "answer has no peer to reach");
                Outcome::Dropped
            }
        }
    }

    pub fn candidate(&self, session: SessionId, payload: CandidatePayload) -> Outcome {
        let connection_id = payload.connection_id.clone();
        let candidate = Candidate::from(payload);

        let state = self.state.lock();
        let Some(pair) = state.pairs.get(&connection_id) else {
            debug!(%session, %connection_id, "candidate for unknown connection id dropped");
            return Outcome::Dropped;
        };

        state.route(
            session,
            pair,
            ServerMessage::candidate(&connection_id, candidate),
        )
    }

    pub fn free_worker_count(&self) -> usize {
        self.state.lock().free_workers().len()
    }

    #[cfg(test)]
    pub fn pair(&self, connection_id: &str) -> Option<Pair> {
        self.state.lock().pairs.get(connection_id)
    }

    /// Connection ids `session` currently owns, sorted.
    #[cfg(test)]
    pub fn connection_ids(&self, session: SessionId) -> Vec<String> {
        let state = self.state.lock();
        let mut ids: Vec<String> = state
            .sessions
            .connection_ids(session)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn stats(&self) -> RelayStats {
        let state = self.state.lock();
        let sessions = state.sessions.len();
        let browsers = state.roles.browser_count();
        let complete_pairs = state.pairs.count_complete();
        RelayStats {
            sessions,
            browsers,
            workers: sessions - browsers,
            free_workers: state.free_workers().len(),
            open_pairs: state.pairs.len() - complete_pairs,
            complete_pairs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct Peer {
        id: SessionId,
        rx: mpsc::UnboundedReceiver<ServerMessage>,
    }

    impl Peer {
        fn join(relay: &Relay) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = SessionId::new();
            relay.add_session(SessionHandle::new(id, tx));
            Self { id, rx }
        }

        fn next(&mut self) -> ServerMessage {
            self.rx.try_recv().expect("expected a message")
        }

        fn assert_silent(&mut self) {
            assert!(self.rx.try_recv().is_err(), "unexpected message");
        }
    }

    fn sdp(connection_id: &str, sdp: &str) -> SdpPayload {
        SdpPayload {
            connection_id: connection_id.into(),
            sdp: sdp.into(),
        }
    }

    fn ice(connection_id: &str, candidate: &str) -> CandidatePayload {
        CandidatePayload {
            connection_id: connection_id.into(),
            candidate: candidate.into(),
            sdp_mline_index: Some(0),
            sdp_mid: Some("0".into()),
        }
    }

    fn connect_ack(connection_id: &str, polite: bool) -> ServerMessage {
        ServerMessage::Connect {
            connection_id: connection_id.into(),
            polite,
        }
    }

    #[test_timeout::timeout]
    fn first_connect_opens_impolite_second_completes_polite() {
        let relay = Relay::new();
        let mut a = Peer::join(&relay);
        let mut b = Peer::join(&relay);

        assert_eq!(
            relay.connect(a.id, "room1"),
            Outcome::Connected {
                polite: false,
                opened: true
            }
        );
        assert_eq!(a.next(), connect_ack("room1", false));
        assert_eq!(relay.pair("room1"), Some(Pair::open(a.id)));

        assert_eq!(
            relay.connect(b.id, "room1"),
            Outcome::Connected {
                polite: true,
                opened: false
            }
        );
        assert_eq!(b.next(), connect_ack("room1", true));
        assert_eq!(relay.pair("room1"), Some(Pair::new(Some(a.id), Some(b.id))));
        assert_eq!(relay.connection_ids(b.id), vec!["room1".to_string()]);
    }

    #[test_timeout::timeout]
    fn third_connect_is_rejected_without_mutation() {
        let relay = Relay::new();
        let mut a = Peer::join(&relay);
        let mut b = Peer::join(&relay);
        let mut c = Peer::join(&relay);

        relay.connect(a.id, "room1");
        relay.connect(b.id, "room1");
        a.next();
        b.next();

        assert_eq!(relay.connect(c.id, "room1"), Outcome::Rejected);
        assert_eq!(
            c.next(),
            ServerMessage::Error {
                message: "room1: This connection id is already used.".into()
            }
        );
        assert_eq!(relay.pair("room1"), Some(Pair::new(Some(a.id), Some(b.id))));
        assert!(relay.connection_ids(c.id).is_empty());
        a.assert_silent();
        b.assert_silent();
    }

    #[test_timeout::timeout]
    fn repeated_connect_from_occupant_is_reacknowledged() {
        let relay = Relay::new();
        let mut a = Peer::join(&relay);

        relay.connect(a.id, "room1");
        a.next();

        assert_eq!(
            relay.connect(a.id, "room1"),
            Outcome::Connected {
                polite: false,
                opened: false
            }
        );
        assert_eq!(a.next(), connect_ack("room1", false));
        assert_eq!(relay.pair("room1"), Some(Pair::open(a.id)));
    }

    #[test_timeout::timeout]
    fn offer_without_pair_is_dropped() {
        let relay = Relay::new();
        let a = Peer::join(&relay);
        let mut worker = Peer::join(&relay);

        assert_eq!(relay.offer(a.id, sdp("nowhere", "x")), Outcome::Dropped);
        assert_eq!(relay.candidate(a.id, ice("nowhere", "c")), Outcome::Dropped);
        assert_eq!(relay.answer(worker.id, sdp("nowhere", "y")), Outcome::Dropped);
        worker.assert_silent();
        assert!(relay.pair("nowhere").is_none());
    }

    #[test_timeout::timeout]
    fn open_pair_offer_reaches_only_free_workers() {
        let relay = Relay::new();
        let mut browser = Peer::join(&relay);
        let mut free = Peer::join(&relay);
        let mut busy = Peer::join(&relay);
        let mut other_browser = Peer::join(&relay);

        relay.connect(browser.id, "room1");
        browser.next();

        // `busy` is locked into a complete pair with another browser.
        relay.connect(other_browser.id, "room2");
        relay.offer(other_browser.id, sdp("room2", "o"));
        relay.answer(busy.id, sdp("room2", "a"));
        assert!(matches!(other_browser.next(), ServerMessage::Connect { .. }));
        assert!(matches!(other_browser.next(), ServerMessage::Answer { .. }));
        assert!(matches!(free.next(), ServerMessage::Offer { .. }));
        assert!(matches!(busy.next(), ServerMessage::Offer { .. }));
        browser.assert_silent();

        assert_eq!(
            relay.offer(browser.id, sdp("room1", "x")),
            Outcome::Broadcast { recipients: 1 }
        );
        match free.next() {
            ServerMessage::Offer { from, to, data } => {
                assert_eq!(from, "room1");
                assert_eq!(to, "");
                assert_eq!(data.sdp, "x");
                assert!(data.polite);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        busy.assert_silent();
        other_browser.assert_silent();
        browser.assert_silent();
    }

    #[test_timeout::timeout]
    fn answer_pairs_worker_and_stops_broadcast() {
        let relay = Relay::new();
        let mut browser = Peer::join(&relay);
        let mut u = Peer::join(&relay);
        let mut v = Peer::join(&relay);

        relay.connect(browser.id, "room1");
        browser.next();
        relay.offer(browser.id, sdp("room1", "x"));
        u.next();
        v.next();

        assert_eq!(relay.answer(u.id, sdp("room1", "y")), Outcome::Delivered);
        assert_eq!(relay.pair("room1"), Some(Pair::new(Some(browser.id), Some(u.id))));
        assert_eq!(relay.connection_ids(u.id), vec!["room1".to_string()]);
        match browser.next() {
            ServerMessage::Answer { from, data, .. } => {
                assert_eq!(from, "room1");
                assert_eq!(data.sdp, "y");
            }
            other => panic!("unexpected message: {other:?}"),
        }
        v.assert_silent();

        assert_eq!(relay.offer(browser.id, sdp("room1", "x2")), Outcome::Delivered);
        assert_eq!(
            relay.candidate(browser.id, ice("room1", "c")),
            Outcome::Delivered
        );
        assert!(matches!(u.next(), ServerMessage::Offer { .. }));
        assert!(matches!(u.next(), ServerMessage::Candidate { .. }));
        v.assert_silent();
        assert_eq!(relay.free_worker_count(), 1);
    }

    #[test_timeout::timeout]
    fn candidate_from_worker_goes_to_browser() {
        let relay = Relay::new();
        let mut browser = Peer::join(&relay);
        let mut worker = Peer::join(&relay);

        relay.connect(browser.id, "room1");
        browser.next();
        relay.answer(worker.id, sdp("room1", "y"));
        browser.next();

        assert_eq!(
            relay.candidate(worker.id, ice("room1", "c1")),
            Outcome::Delivered
        );
        match browser.next() {
            ServerMessage::Candidate { from, to, data } => {
                assert_eq!(from, "room1");
                assert_eq!(to, "");
                assert_eq!(data.candidate, "c1");
                assert_eq!(data.sdp_mline_index, Some(0));
                assert_eq!(data.sdp_mid.as_deref(), Some("0"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
        worker.assert_silent();
    }

    #[test_timeout::timeout]
    fn candidate_on_open_pair_is_broadcast_without_creating_pairs() {
        let relay = Relay::new();
        let mut browser = Peer::join(&relay);
        let mut worker = Peer::join(&relay);

        relay.connect(browser.id, "room1");
        browser.next();

        assert_eq!(
            relay.candidate(browser.id, ice("room1", "c")),
            Outcome::Broadcast { recipients: 1 }
        );
        assert!(matches!(worker.next(), ServerMessage::Candidate { .. }));
        assert_eq!(relay.pair("room1"), Some(Pair::open(browser.id)));
        assert!(relay.connection_ids(worker.id).is_empty());
    }

    #[test_timeout::timeout]
    fn disconnect_notifies_peer_and_acknowledges() {
        let relay = Relay::new();
        let mut a = Peer::join(&relay);
        let mut b = Peer::join(&relay);

        relay.connect(a.id, "room1");
        relay.connect(b.id, "room1");
        a.next();
        b.next();

        assert_eq!(relay.disconnect(a.id, "room1"), Outcome::Disconnected);
        assert_eq!(b.next(), ServerMessage::disconnect("room1"));
        assert_eq!(a.next(), ServerMessage::disconnect("room1"));
        assert!(relay.pair("room1").is_none());
        assert!(relay.connection_ids(a.id).is_empty());

        // Without a pair the caller is still acknowledged.
        assert_eq!(relay.disconnect(a.id, "room1"), Outcome::Disconnected);
        assert_eq!(a.next(), ServerMessage::disconnect("room1"));
        b.assert_silent();
    }

    #[test_timeout::timeout]
    fn disconnect_deletes_open_pair() {
        let relay = Relay::new();
        let mut a = Peer::join(&relay);

        relay.connect(a.id, "room1");
        a.next();
        relay.disconnect(a.id, "room1");
        assert_eq!(a.next(), ServerMessage::disconnect("room1"));
        assert!(relay.pair("room1").is_none());

        relay.connect(a.id, "room1");
        assert_eq!(a.next(), connect_ack("room1", false));
    }

    #[test_timeout::timeout]
    fn closing_session_notifies_every_peer_it_held() {
        let relay = Relay::new();
        let a = Peer::join(&relay);
        let mut b = Peer::join(&relay);
        let mut c = Peer::join(&relay);

        relay.connect(a.id, "room1");
        relay.connect(b.id, "room1");
        relay.connect(a.id, "room2");
        relay.connect(c.id, "room2");
        relay.connect(a.id, "room3");
        b.next();
        c.next();

        relay.remove_session(a.id);

        assert_eq!(b.next(), ServerMessage::disconnect("room1"));
        assert_eq!(c.next(), ServerMessage::disconnect("room2"));
        b.assert_silent();
        c.assert_silent();
        assert!(relay.pair("room1").is_none());
        assert!(relay.pair("room2").is_none());
        assert!(relay.pair("room3").is_none());
        assert_eq!(relay.stats().sessions, 2);

        relay.remove_session(a.id);
    }

    #[test_timeout::timeout]
    fn closing_displaced_worker_still_tears_down_its_ids() {
        let relay = Relay::new();
        let mut browser = Peer::join(&relay);
        let mut first = Peer::join(&relay);
        let mut second = Peer::join(&relay);

        relay.connect(browser.id, "room1");
        browser.next();
        relay.offer(browser.id, sdp("room1", "x"));
        first.next();
        second.next();

        relay.answer(first.id, sdp("room1", "y1"));
        browser.next();
        // A late answer takes over the second slot from `first`.
        relay.answer(second.id, sdp("room1", "y2"));
        browser.next();
        assert_eq!(
            relay.pair("room1"),
            Some(Pair::new(Some(browser.id), Some(second.id)))
        );

        relay.remove_session(first.id);
        assert!(relay.pair("room1").is_none());
        assert_eq!(browser.next(), ServerMessage::disconnect("room1"));
        browser.assert_silent();
        second.assert_silent();
    }

    #[test_timeout::timeout]
    fn occupant_reconnecting_to_complete_pair_is_rejected() {
        let relay = Relay::new();
        let mut a = Peer::join(&relay);
        let mut b = Peer::join(&relay);

        relay.connect(a.id, "room1");
        relay.connect(b.id, "room1");
        a.next();
        b.next();

        assert_eq!(relay.connect(a.id, "room1"), Outcome::Rejected);
        assert_eq!(a.next(), ServerMessage::already_used("room1"));
        assert_eq!(relay.connect(b.id, "room1"), Outcome::Rejected);
        assert_eq!(b.next(), ServerMessage::already_used("room1"));
        assert_eq!(relay.pair("room1"), Some(Pair::new(Some(a.id), Some(b.id))));
    }

    #[test_timeout::timeout]
    fn outsider_disconnect_notifies_only_slot0() {
        let relay = Relay::new();
        let mut a = Peer::join(&relay);
        let mut b = Peer::join(&relay);
        let mut c = Peer::join(&relay);

        relay.connect(a.id, "room1");
        relay.connect(b.id, "room1");
        a.next();
        b.next();

        relay.disconnect(c.id, "room1");
        assert_eq!(a.next(), ServerMessage::disconnect("room1"));
        assert_eq!(c.next(), ServerMessage::disconnect("room1"));
        b.assert_silent();
        assert!(relay.pair("room1").is_none());
    }

    #[test_timeout::timeout]
    fn broadcast_includes_a_free_worker_sender() {
        let relay = Relay::new();
        let mut worker = Peer::join(&relay);
        let mut idle = Peer::join(&relay);

        relay
            .state
            .lock()
            .pairs
            .set("room1", Pair::new(None, Some(worker.id)));

        assert_eq!(
            relay.offer(worker.id, sdp("room1", "x")),
            Outcome::Broadcast { recipients: 2 }
        );
        assert!(matches!(worker.next(), ServerMessage::Offer { .. }));
        assert!(matches!(idle.next(), ServerMessage::Offer { .. }));

        assert_eq!(
            relay.candidate(worker.id, ice("room1", "c")),
            Outcome::Broadcast { recipients: 2 }
        );
        assert!(matches!(worker.next(), ServerMessage::Candidate { .. }));
        assert!(matches!(idle.next(), ServerMessage::Candidate { .. }));
    }

    #[test_timeout::timeout]
    fn outcome_labels_distinguish_connect_paths() {
        let relay = Relay::new();
        let mut a = Peer::join(&relay);
        let mut b = Peer::join(&relay);

        assert_eq!(relay.connect(a.id, "room1").label(), "opened");
        assert_eq!(relay.connect(a.id, "room1").label(), "reconnected");
        assert_eq!(relay.connect(b.id, "room1").label(), "joined");
        assert_eq!(relay.connect(a.id, "room1").label(), "rejected");
        assert_eq!(a.next(), connect_ack("room1", false));
        assert_eq!(a.next(), connect_ack("room1", false));
        assert_eq!(b.next(), connect_ack("room1", true));
        assert_eq!(a.next(), ServerMessage::already_used("room1"));
    }

    #[test_timeout::timeout]
    fn unknown_event_is_ignored() {
        let relay = Relay::new();
        let mut a = Peer::join(&relay);

        assert_eq!(relay.handle(a.id, ClientMessage::Unknown), Outcome::Ignored);
        a.assert_silent();
    }

    #[test_timeout::timeout]
    fn handle_dispatches_by_event_kind() {
        let relay = Relay::new();
        let mut a = Peer::join(&relay);

        let outcome = relay.handle(
            a.id,
            ClientMessage::Connect {
                connection_id: "room1".into(),
            },
        );
        assert_eq!(
            outcome,
            Outcome::Connected {
                polite: false,
                opened: true
            }
        );
        assert_eq!(a.next(), connect_ack("room1", false));

        let outcome = relay.handle(
            a.id,
            ClientMessage::Disconnect {
                connection_id: "room1".into(),
            },
        );
        assert_eq!(outcome, Outcome::Disconnected);
        assert_eq!(a.next(), ServerMessage::disconnect("room1"));
    }

    #[test_timeout::timeout]
    fn round_trip_between_browser_and_worker() {
        let relay = Relay::new();
        let mut a = Peer::join(&relay);
        let mut u = Peer::join(&relay);

        relay.connect(a.id, "room1");
        assert_eq!(a.next(), connect_ack("room1", false));

        relay.offer(a.id, sdp("room1", "x"));
        match u.next() {
            ServerMessage::Offer { from, data, .. } => {
                assert_eq!(from, "room1");
                assert_eq!(data.sdp, "x");
                assert!(data.polite);
            }
            other => panic!("unexpected message: {other:?}"),
        }

        relay.answer(u.id, sdp("room1", "y"));
        match a.next() {
            ServerMessage::Answer { from, data, .. } => {
                assert_eq!(from, "room1");
                assert_eq!(data.sdp, "y");
            }
            other => panic!("unexpected message: {other:?}"),
        }

        relay.disconnect(a.id, "room1");
        assert_eq!(u.next(), ServerMessage::disconnect("room1"));
        assert_eq!(a.next(), ServerMessage::disconnect("room1"));
        assert_eq!(relay.free_worker_count(), 1);
    }

    #[test_timeout::timeout]
    fn stats_reflect_roles_and_pairs() {
        let relay = Relay::new();
        let a = Peer::join(&relay);
        let b = Peer::join(&relay);
        let w1 = Peer::join(&relay);
        let _w2 = Peer::join(&relay);

        relay.connect(a.id, "room1");
        relay.connect(b.id, "room2");
        relay.answer(w1.id, sdp("room2", "y"));

        assert_eq!(
            relay.stats(),
            RelayStats {
                sessions: 4,
                browsers: 2,
                workers: 2,
                free_workers: 1,
                open_pairs: 1,
                complete_pairs: 1,
            }
        );
    }
}
