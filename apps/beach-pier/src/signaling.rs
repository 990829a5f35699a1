use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch, stamped on every relayed negotiation message.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// SDP body carried by inbound `offer` and `answer` events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SdpPayload {
    pub connection_id: String,
    pub sdp: String,
}

/// ICE candidate body carried by inbound `candidate` events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePayload {
    pub connection_id: String,
    pub candidate: String,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u32>,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
}

/// Messages sent from a browser or worker to the relay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open or join the pairing for a connection id (browser only)
    Connect {
        #[serde(rename = "connectionId")]
        connection_id: String,
    },
    /// Leave the pairing for a connection id
    Disconnect {
        #[serde(rename = "connectionId")]
        connection_id: String,
    },
    Offer { data: SdpPayload },
    /// Answer to a relayed offer (worker only)
    Answer { data: SdpPayload },
    Candidate { data: CandidatePayload },
    /// Any event type the relay does not understand
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Connect { .. } => "connect",
            ClientMessage::Disconnect { .. } => "disconnect",
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::Candidate { .. } => "candidate",
            ClientMessage::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Offer {
    pub sdp: String,
    pub timestamp: i64,
    /// Tells the receiver to back off when both sides offer at once
    pub polite: bool,
}

impl Offer {
    pub fn new(sdp: String) -> Self {
        Self {
            sdp,
            timestamp: now_millis(),
            polite: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    pub sdp: String,
    pub timestamp: i64,
}

impl Answer {
    pub fn new(sdp: String) -> Self {
        Self {
            sdp,
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Candidate {
    pub candidate: String,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u32>,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    pub timestamp: i64,
}

impl From<CandidatePayload> for Candidate {
    fn from(payload: CandidatePayload) -> Self {
        Self {
            candidate: payload.candidate,
            sdp_mline_index: payload.sdp_mline_index,
            sdp_mid: payload.sdp_mid,
            timestamp: now_millis(),
        }
    }
}

/// Messages sent from the relay to a browser or worker
///
/// Negotiation messages keep `to` empty: the recipient is chosen by which
/// session the relay writes to, never by message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Acknowledge a connect with the glare-resolution role for this pairing
    Connect {
        #[serde(rename = "connectionId")]
        connection_id: String,
        polite: bool,
    },
    /// Peer left, or acknowledgement of our own disconnect
    Disconnect {
        #[serde(rename = "connectionId")]
        connection_id: String,
    },
    Error {
        message: String,
    },
    Offer {
        from: String,
        to: String,
        data: Offer,
    },
    Answer {
        from: String,
        to: String,
        data: Answer,
    },
    Candidate {
        from: String,
        to: String,
        data: Candidate,
    },
}

impl ServerMessage {
    pub fn offer(connection_id: &str, data: Offer) -> Self {
        ServerMessage::Offer {
            from: connection_id.to_string(),
            to: String::new(),
            data,
        }
    }

    pub fn answer(connection_id: &str, data: Answer) -> Self {
        ServerMessage::Answer {
            from: connection_id.to_string(),
            to: String::new(),
            data,
        }
    }

    pub fn candidate(connection_id: &str, data: Candidate) -> Self {
        ServerMessage::Candidate {
            from: connection_id.to_string(),
            to: String::new(),
            data,
        }
    }

    pub fn disconnect(connection_id: &str) -> Self {
        ServerMessage::Disconnect {
            connection_id: connection_id.to_string(),
        }
    }

    pub fn already_used(connection_id: &str) -> Self {
        ServerMessage::Error {
            message: format!("{connection_id}: This connection id is already used."),
        }
    }
}
