/// A gift listed in the marketplace catalog.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StarGift {
    pub id: i64,
    /// Price in stars.
    pub stars: i64,
    /// Total supply; 0 means unlimited.
    pub availability_total: i32,
    pub availability_remains: i32,
    pub can_upgrade: bool,
}

impl StarGift {
    /// Limited gifts have a finite total supply.
    pub fn is_limited(&self) -> bool {
        self.availability_total > 0
    }
}

/// Reply to a catalog request carrying the previous change-token.
#[derive(Debug, Clone)]
pub enum StarGifts {
    NotModified,
    Gifts { hash: i32, gifts: Vec<StarGift> },
    /// Any reply kind the bot does not understand.
    Unknown,
}

/// A gift held by the acting account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedGift {
    pub msg_id: i32,
    pub can_upgrade: bool,
}

/// The account the session is authorized as.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub username: Option<String>,
}

impl Account {
    /// Peer name that addresses this account: its username, or the `me` alias.
    pub fn peer_name(&self) -> String {
        match &self.username {
            Some(name) if !name.is_empty() => name.clone(),
            _ => SELF_ALIAS.to_string(),
        }
    }
}

/// Peer name that always resolves to the acting account.
pub const SELF_ALIAS: &str = "me";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerKind {
    /// The acting account itself; `id` and `access_hash` are unused.
    SelfUser,
    User,
    Chat,
    Channel,
}

/// A resolved peer, usable as a message or invoice destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPeer {
    pub kind: PeerKind,
    pub id: i64,
    pub access_hash: i64,
}

impl InputPeer {
    pub fn user(id: i64, access_hash: i64) -> Self {
        Self {
            kind: PeerKind::User,
            id,
            access_hash,
        }
    }

    pub fn self_user() -> Self {
        Self {
            kind: PeerKind::SelfUser,
            id: 0,
            access_hash: 0,
        }
    }
}

/// Invoice for buying one gift for a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiftInvoice {
    pub peer: InputPeer,
    pub gift_id: i64,
    pub include_upgrade: bool,
    pub hide_name: bool,
    /// Plain-text note attached to the gift.
    pub message: Option<String>,
}

/// Payment form returned for an invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentForm {
    StarGift { form_id: i64 },
    /// Any form kind other than a star gift form.
    Other,
}

/// Result of submitting a stars payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentResult {
    Done,
    VerificationNeeded { url: String },
}
