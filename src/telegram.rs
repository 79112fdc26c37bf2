use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use grammers_client::client::{LoginToken, PasswordToken};
use grammers_client::message::InputMessage;
use grammers_client::session::storages::MemorySession;
use grammers_client::session::types::PeerRef;
use grammers_client::session::{Session, SessionData};
use grammers_client::{Client, SenderPool, SignInError, tl};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::api::{GiftMarket, SessionAuthority, SignIn};
use crate::types::{
    Account, GiftInvoice, InputPeer, PaymentForm, PaymentResult, PeerKind, SELF_ALIAS, SavedGift,
    StarGift, StarGifts,
};

/// Leading byte of every exported session string.
const SESSION_VERSION: u8 = 1;

const AUTH_KEY_LEN: usize = 256;

/// version + big-endian datacenter id + authorization key
const SESSION_LEN: usize = 1 + 4 + AUTH_KEY_LEN;

/// Held gifts requested per listing. Upgrade sweeps only need the newest ones.
const SAVED_GIFTS_PAGE: i32 = 100;

/// Encode the home datacenter and its authorization key as a session string.
pub fn encode_session(dc_id: i32, auth_key: &[u8; AUTH_KEY_LEN]) -> String {
    let mut raw = Vec::with_capacity(SESSION_LEN);
    raw.push(SESSION_VERSION);
    raw.extend_from_slice(&dc_id.to_be_bytes());
    raw.extend_from_slice(auth_key);
    URL_SAFE_NO_PAD.encode(raw)
}

/// Decode a session string into datacenter id and authorization key.
pub fn decode_session(session: &str) -> Result<(i32, [u8; AUTH_KEY_LEN])> {
    let raw = URL_SAFE_NO_PAD
        .decode(session.trim())
        .context("session is not valid base64")?;
    if raw.len() != SESSION_LEN {
        bail!("session has {} bytes, expected {SESSION_LEN}", raw.len());
    }
    if raw[0] != SESSION_VERSION {
        bail!("unsupported session version {}", raw[0]);
    }
    let dc_id = i32::from_be_bytes(raw[1..5].try_into()?);
    let auth_key: [u8; AUTH_KEY_LEN] = raw[5..].try_into()?;
    Ok((dc_id, auth_key))
}

/// Session storage seeded with a restored authorization key.
fn session_data(dc_id: i32, auth_key: [u8; AUTH_KEY_LEN]) -> Result<SessionData> {
    let mut data = SessionData::default();
    let option = data
        .dc_options
        .get_mut(&dc_id)
        .with_context(|| format!("session names unknown datacenter {dc_id}"))?;
    option.auth_key = Some(auth_key);
    data.home_dc = dc_id;
    Ok(data)
}

fn raw_peer(peer: &InputPeer) -> tl::enums::InputPeer {
    match peer.kind {
        PeerKind::SelfUser => tl::enums::InputPeer::PeerSelf,
        PeerKind::User => tl::enums::InputPeer::User(tl::types::InputPeerUser {
            user_id: peer.id,
            access_hash: peer.access_hash,
        }),
        PeerKind::Chat => tl::enums::InputPeer::Chat(tl::types::InputPeerChat { chat_id: peer.id }),
        PeerKind::Channel => tl::enums::InputPeer::Channel(tl::types::InputPeerChannel {
            channel_id: peer.id,
            access_hash: peer.access_hash,
        }),
    }
}

fn peer_from_raw(raw: &tl::enums::InputPeer) -> Result<InputPeer> {
    Ok(match raw {
        tl::enums::InputPeer::PeerSelf => InputPeer::self_user(),
        tl::enums::InputPeer::User(u) => InputPeer::user(u.user_id, u.access_hash),
        tl::enums::InputPeer::Chat(c) => InputPeer {
            kind: PeerKind::Chat,
            id: c.chat_id,
            access_hash: 0,
        },
        tl::enums::InputPeer::Channel(c) => InputPeer {
            kind: PeerKind::Channel,
            id: c.channel_id,
            access_hash: c.access_hash,
        },
        other => bail!("peer {other:?} cannot be addressed directly"),
    })
}

fn raw_invoice(invoice: &GiftInvoice) -> tl::enums::InputInvoice {
    tl::types::InputInvoiceStarGift {
        hide_name: invoice.hide_name,
        include_upgrade: invoice.include_upgrade,
        peer: raw_peer(&invoice.peer),
        gift_id: invoice.gift_id,
        message: invoice.message.as_ref().map(|text| {
            tl::types::TextWithEntities {
                text: text.clone(),
                entities: Vec::new(),
            }
            .into()
        }),
    }
    .into()
}

/// Catalog entry, or `None` for unique (already upgraded) gifts which cannot be bought.
fn gift_from_raw(raw: &tl::enums::StarGift) -> Option<StarGift> {
    match raw {
        tl::enums::StarGift::Gift(g) => Some(StarGift {
            id: g.id,
            stars: g.stars,
            availability_total: g.availability_total.unwrap_or(0),
            availability_remains: g.availability_remains.unwrap_or(0),
            can_upgrade: g.upgrade_stars.is_some(),
        }),
        tl::enums::StarGift::Unique(_) => None,
    }
}

/// Held gift, or `None` when it was not delivered by a message (e.g. saved by a channel).
fn saved_from_raw(raw: &tl::enums::SavedStarGift) -> Option<SavedGift> {
    let tl::enums::SavedStarGift::Gift(g) = raw;
    g.msg_id.map(|msg_id| SavedGift {
        msg_id,
        can_upgrade: g.can_upgrade,
    })
}

enum LoginState {
    Idle,
    CodeSent(LoginToken),
    PasswordNeeded(PasswordToken),
}

/// Telegram user client backed by grammers.
///
/// The session lives in memory; it is seeded from an exported session
/// string and can be exported again after an interactive login.
pub struct TelegramClient {
    client: Client,
    session: Arc<MemorySession>,
    app_hash: String,
    login: Mutex<LoginState>,
}

impl TelegramClient {
    fn start(session: MemorySession, app_id: i32, app_hash: &str) -> Self {
        let session = Arc::new(session);
        let SenderPool { runner, handle, .. } = SenderPool::new(Arc::clone(&session), app_id);
        let client = Client::new(handle);
        tokio::spawn(runner.run());
        Self {
            client,
            session,
            app_hash: app_hash.to_string(),
            login: Mutex::new(LoginState::Idle),
        }
    }

    /// Open a connection with a fresh, not yet authorized session (used by the login flow).
    pub fn connect(app_id: i32, app_hash: &str) -> Self {
        Self::start(MemorySession::default(), app_id, app_hash)
    }

    /// Open a connection and restore an exported session.
    ///
    /// The session is checked by fetching the account it is authorized as.
    pub async fn connect_with_session(
        app_id: i32,
        app_hash: &str,
        session: &str,
    ) -> Result<(Self, Account)> {
        let (dc_id, auth_key) = decode_session(session).context("failed to import session")?;
        let data = session_data(dc_id, auth_key)?;
        let client = Self::start(MemorySession::from(data), app_id, app_hash);

        if !client
            .client
            .is_authorized()
            .await
            .context("failed to reach Telegram")?
        {
            bail!("session is not authorized; run `gift-buyer --auth` again");
        }
        let me = client
            .client
            .get_me()
            .await
            .context("failed to fetch own account")?;
        let account = Account {
            id: me.id().bare_id_unchecked(),
            username: me.username().map(str::to_string),
        };
        debug!("Restored session on DC {dc_id}");
        Ok((client, account))
    }
}

#[async_trait]
impl GiftMarket for TelegramClient {
    async fn star_gifts(&self, hash: i32) -> Result<StarGifts> {
        let raw = self
            .client
            .invoke(&tl::functions::payments::GetStarGifts { hash })
            .await
            .context("payments.getStarGifts failed")?;
        Ok(match raw {
            tl::enums::payments::StarGifts::NotModified => StarGifts::NotModified,
            tl::enums::payments::StarGifts::Gifts(list) => StarGifts::Gifts {
                hash: list.hash,
                gifts: list.gifts.iter().filter_map(gift_from_raw).collect(),
            },
        })
    }

    async fn saved_star_gifts(&self) -> Result<Vec<SavedGift>> {
        let raw = self
            .client
            .invoke(&tl::functions::payments::GetSavedStarGifts {
                exclude_unsaved: false,
                exclude_saved: false,
                exclude_unlimited: false,
                exclude_unique: false,
                sort_by_value: false,
                exclude_upgradable: false,
                exclude_unupgradable: false,
                peer_color_available: false,
                exclude_hosted: false,
                peer: tl::enums::InputPeer::PeerSelf,
                collection_id: None,
                offset: String::new(),
                limit: SAVED_GIFTS_PAGE,
            })
            .await
            .context("payments.getSavedStarGifts failed")?;
        let tl::enums::payments::SavedStarGifts::Gifts(page) = raw;
        Ok(page.gifts.iter().filter_map(saved_from_raw).collect())
    }

    async fn resolve_peer(&self, peer: &str) -> Result<InputPeer> {
        let name = peer.trim().trim_start_matches('@');
        if name == SELF_ALIAS {
            return Ok(InputPeer::self_user());
        }
        let found = self
            .client
            .resolve_username(name)
            .await
            .with_context(|| format!("contacts.resolveUsername {name} failed"))?
            .with_context(|| format!("no peer named {name}"))?;
        let peer_ref = found
            .to_ref()
            .await
            .map_err(|e| anyhow!(e))?
            .with_context(|| format!("peer {name} has no usable access hash"))?;
        let raw: tl::enums::InputPeer = (&peer_ref).into();
        peer_from_raw(&raw)
    }

    async fn payment_form(&self, invoice: &GiftInvoice) -> Result<PaymentForm> {
        let raw = self
            .client
            .invoke(&tl::functions::payments::GetPaymentForm {
                invoice: raw_invoice(invoice),
                theme_params: None,
            })
            .await
            .context("payments.getPaymentForm failed")?;
        Ok(match raw {
            tl::enums::payments::PaymentForm::StarGift(form) => PaymentForm::StarGift {
                form_id: form.form_id,
            },
            _ => PaymentForm::Other,
        })
    }

    async fn send_stars_form(&self, form_id: i64, invoice: &GiftInvoice) -> Result<PaymentResult> {
        let raw = self
            .client
            .invoke(&tl::functions::payments::SendStarsForm {
                form_id,
                invoice: raw_invoice(invoice),
            })
            .await
            .context("payments.sendStarsForm failed")?;
        Ok(match raw {
            tl::enums::payments::PaymentResult::Result(_) => PaymentResult::Done,
            tl::enums::payments::PaymentResult::PaymentVerificationNeeded(v) => {
                PaymentResult::VerificationNeeded { url: v.url }
            }
        })
    }

    async fn upgrade_star_gift(&self, msg_id: i32) -> Result<()> {
        self.client
            .invoke(&tl::functions::payments::UpgradeStarGift {
                keep_original_details: false,
                stargift: tl::types::InputSavedStarGiftUser { msg_id }.into(),
            })
            .await
            .context("payments.upgradeStarGift failed")?;
        Ok(())
    }

    async fn send_message(&self, peer: &InputPeer, html: &str) -> Result<()> {
        let target = PeerRef::from(raw_peer(peer));
        self.client
            .send_message(target, InputMessage::new().html(html))
            .await
            .context("messages.sendMessage failed")?;
        Ok(())
    }
}

#[async_trait]
impl SessionAuthority for TelegramClient {
    async fn send_code(&self, phone: &str) -> Result<()> {
        let token = self
            .client
            .request_login_code(phone, &self.app_hash)
            .await
            .context("auth.sendCode failed")?;
        *self.login.lock().await = LoginState::CodeSent(token);
        Ok(())
    }

    async fn sign_in(&self, code: &str) -> Result<SignIn> {
        let mut login = self.login.lock().await;
        let LoginState::CodeSent(token) = &*login else {
            bail!("no login code was requested");
        };
        let result = self.client.sign_in(token, code).await;
        match result {
            Ok(user) => {
                info!("Signed in as user {}", user.id().bare_id_unchecked());
                *login = LoginState::Idle;
                Ok(SignIn::Authorized)
            }
            Err(SignInError::PasswordRequired(password)) => {
                *login = LoginState::PasswordNeeded(password);
                Ok(SignIn::PasswordRequired)
            }
            Err(e) => Err(anyhow!(e).context("auth.signIn failed")),
        }
    }

    async fn check_password(&self, password: &str) -> Result<()> {
        let mut login = self.login.lock().await;
        let token = match std::mem::replace(&mut *login, LoginState::Idle) {
            LoginState::PasswordNeeded(token) => token,
            other => {
                *login = other;
                bail!("no password was requested");
            }
        };
        match self.client.check_password(token, password).await {
            Ok(user) => {
                info!("Signed in as user {}", user.id().bare_id_unchecked());
                Ok(())
            }
            Err(SignInError::InvalidPassword(token)) => {
                *login = LoginState::PasswordNeeded(token);
                bail!("invalid password");
            }
            Err(e) => Err(anyhow!(e).context("auth.checkPassword failed")),
        }
    }

    async fn export_session(&self) -> Result<String> {
        let dc_id = self.session.home_dc_id()?;
        let auth_key = self
            .session
            .dc_option(dc_id)?
            .and_then(|option| option.auth_key)
            .with_context(|| format!("no authorization key for DC {dc_id}"))?;
        Ok(encode_session(dc_id, &auth_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(fill: u8) -> [u8; AUTH_KEY_LEN] {
        let mut key = [fill; AUTH_KEY_LEN];
        key[0] = 0xAB;
        key[AUTH_KEY_LEN - 1] = 0xCD;
        key
    }

    // ── session strings ──

    #[test]
    fn session_string_restores_home_dc_and_key() {
        let exported = encode_session(4, &key(7));
        assert!(!exported.contains('='));

        let (dc_id, auth_key) = decode_session(&exported).unwrap();
        let data = session_data(dc_id, auth_key).unwrap();
        assert_eq!(data.home_dc, 4);
        assert_eq!(data.dc_options[&4].auth_key, Some(key(7)));
        assert!(data.dc_options[&2].auth_key.is_none());
    }

    #[test]
    fn session_string_tolerates_surrounding_whitespace() {
        let exported = format!("  {}\n", encode_session(2, &key(1)));
        assert_eq!(decode_session(&exported).unwrap().0, 2);
    }

    #[test]
    fn malformed_session_rejected() {
        assert!(decode_session("not base64!").is_err());
        assert!(decode_session(&URL_SAFE_NO_PAD.encode([1u8; 10])).is_err());

        let mut wrong_version = vec![9u8];
        wrong_version.extend_from_slice(&2i32.to_be_bytes());
        wrong_version.extend_from_slice(&key(0));
        let err = decode_session(&URL_SAFE_NO_PAD.encode(wrong_version)).unwrap_err();
        assert!(err.to_string().contains("version"), "{err}");
    }

    #[test]
    fn unknown_datacenter_rejected() {
        let (dc_id, auth_key) = decode_session(&encode_session(42, &key(3))).unwrap();
        assert!(session_data(dc_id, auth_key).is_err());
    }

    // ── peers and invoices ──

    #[test]
    fn peers_map_to_matching_input_peers() {
        let user = InputPeer::user(10, 20);
        assert!(matches!(
            raw_peer(&user),
            tl::enums::InputPeer::User(tl::types::InputPeerUser { user_id: 10, access_hash: 20 })
        ));
        assert!(matches!(raw_peer(&InputPeer::self_user()), tl::enums::InputPeer::PeerSelf));

        let channel = InputPeer {
            kind: PeerKind::Channel,
            id: 5,
            access_hash: 6,
        };
        assert_eq!(peer_from_raw(&raw_peer(&channel)).unwrap(), channel);
        assert_eq!(peer_from_raw(&raw_peer(&user)).unwrap(), user);
    }

    #[test]
    fn empty_peer_cannot_be_addressed() {
        assert!(peer_from_raw(&tl::enums::InputPeer::Empty).is_err());
    }

    #[test]
    fn invoice_carries_note_as_plain_text() {
        let invoice = GiftInvoice {
            peer: InputPeer::self_user(),
            gift_id: 42,
            include_upgrade: true,
            hide_name: false,
            message: Some("auto-buy".to_string()),
        };
        let tl::enums::InputInvoice::StarGift(raw) = raw_invoice(&invoice) else {
            panic!("expected a star gift invoice");
        };
        assert_eq!(raw.gift_id, 42);
        assert!(raw.include_upgrade);
        assert!(!raw.hide_name);
        assert!(matches!(raw.peer, tl::enums::InputPeer::PeerSelf));
        match raw.message {
            Some(tl::enums::TextWithEntities::Entities(text)) => {
                assert_eq!(text.text, "auto-buy");
                assert!(text.entities.is_empty());
            }
            None => panic!("note missing"),
        }
    }
}
