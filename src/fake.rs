//! In-memory `GiftMarket` used by unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;

use crate::api::GiftMarket;
use crate::types::{GiftInvoice, InputPeer, PaymentForm, PaymentResult, SavedGift, StarGifts};

#[derive(Default)]
struct Inner {
    responses: VecDeque<Result<StarGifts, String>>,
    requested_hashes: Vec<i32>,
    unresolvable: HashSet<String>,
    resolved: Vec<String>,
    attempts: Vec<i64>,
    paid: Vec<GiftInvoice>,
    successes_before_failure: HashMap<i64, usize>,
    unexpected_form: bool,
    verification_url: Option<String>,
    messages: Vec<(InputPeer, String)>,
    fail_messages: bool,
    saved: Vec<SavedGift>,
    saved_calls: usize,
    fail_saved_calls: usize,
    upgraded: Vec<i32>,
}

#[derive(Default)]
pub struct FakeMarket {
    inner: Mutex<Inner>,
}

impl FakeMarket {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap();
        f(&mut inner)
    }

    /// Queue a catalog reply. An empty queue answers "not modified".
    pub fn push_response(&self, resp: StarGifts) {
        self.with(|i| i.responses.push_back(Ok(resp)));
    }

    pub fn push_error(&self, msg: &str) {
        self.with(|i| i.responses.push_back(Err(msg.to_string())));
    }

    /// Let `n` purchases of `gift_id` succeed, then fail every later one.
    pub fn fail_gift_after(&self, gift_id: i64, n: usize) {
        self.with(|i| i.successes_before_failure.insert(gift_id, n));
    }

    pub fn fail_resolution(&self, name: &str) {
        self.with(|i| i.unresolvable.insert(name.to_string()));
    }

    pub fn set_unexpected_form(&self, on: bool) {
        self.with(|i| i.unexpected_form = on);
    }

    /// Answer every payment with a verification request.
    pub fn require_verification(&self, url: &str) {
        self.with(|i| i.verification_url = Some(url.to_string()));
    }

    pub fn fail_messages(&self) {
        self.with(|i| i.fail_messages = true);
    }

    pub fn set_saved(&self, saved: Vec<SavedGift>) {
        self.with(|i| i.saved = saved);
    }

    /// Make the next `n` saved-gift listings fail.
    pub fn fail_saved_calls(&self, n: usize) {
        self.with(|i| i.fail_saved_calls = n);
    }

    pub fn requested_hashes(&self) -> Vec<i32> {
        self.with(|i| i.requested_hashes.clone())
    }

    pub fn resolved(&self) -> Vec<String> {
        self.with(|i| i.resolved.clone())
    }

    /// Gift ids in the order payment forms were requested.
    pub fn purchase_attempts(&self) -> Vec<i64> {
        self.with(|i| i.attempts.clone())
    }

    pub fn paid_invoices(&self) -> Vec<GiftInvoice> {
        self.with(|i| i.paid.clone())
    }

    pub fn paid_gift_ids(&self) -> Vec<i64> {
        self.with(|i| i.paid.iter().map(|inv| inv.gift_id).collect())
    }

    pub fn messages(&self) -> Vec<(InputPeer, String)> {
        self.with(|i| i.messages.clone())
    }

    pub fn saved_calls(&self) -> usize {
        self.with(|i| i.saved_calls)
    }

    pub fn upgraded(&self) -> Vec<i32> {
        self.with(|i| i.upgraded.clone())
    }
}

#[async_trait]
impl GiftMarket for FakeMarket {
    async fn star_gifts(&self, hash: i32) -> Result<StarGifts> {
        self.with(|i| {
            i.requested_hashes.push(hash);
            match i.responses.pop_front() {
                Some(Ok(resp)) => Ok(resp),
                Some(Err(msg)) => Err(anyhow!(msg)),
                None => Ok(StarGifts::NotModified),
            }
        })
    }

    async fn saved_star_gifts(&self) -> Result<Vec<SavedGift>> {
        self.with(|i| {
            i.saved_calls += 1;
            if i.fail_saved_calls > 0 {
                i.fail_saved_calls -= 1;
                bail!("saved gifts unavailable");
            }
            Ok(i.saved.clone())
        })
    }

    async fn resolve_peer(&self, peer: &str) -> Result<InputPeer> {
        self.with(|i| {
            if i.unresolvable.contains(peer) {
                bail!("USERNAME_NOT_OCCUPIED");
            }
            i.resolved.push(peer.to_string());
            Ok(InputPeer::user(peer.len() as i64, 0))
        })
    }

    async fn payment_form(&self, invoice: &GiftInvoice) -> Result<PaymentForm> {
        self.with(|i| {
            i.attempts.push(invoice.gift_id);
            if i.unexpected_form {
                return Ok(PaymentForm::Other);
            }
            Ok(PaymentForm::StarGift {
                form_id: i.attempts.len() as i64,
            })
        })
    }

    async fn send_stars_form(&self, _form_id: i64, invoice: &GiftInvoice) -> Result<PaymentResult> {
        self.with(|i| {
            if let Some(url) = &i.verification_url {
                return Ok(PaymentResult::VerificationNeeded { url: url.clone() });
            }
            let done = i.paid.iter().filter(|p| p.gift_id == invoice.gift_id).count();
            if let Some(&limit) = i.successes_before_failure.get(&invoice.gift_id) {
                if done >= limit {
                    bail!("STARGIFT_USAGE_LIMITED");
                }
            }
            i.paid.push(invoice.clone());
            Ok(PaymentResult::Done)
        })
    }

    async fn upgrade_star_gift(&self, msg_id: i32) -> Result<()> {
        self.with(|i| {
            i.upgraded.push(msg_id);
            for gift in i.saved.iter_mut().filter(|g| g.msg_id == msg_id) {
                gift.can_upgrade = false;
            }
            Ok(())
        })
    }

    async fn send_message(&self, peer: &InputPeer, html: &str) -> Result<()> {
        self.with(|i| {
            if i.fail_messages {
                bail!("PEER_ID_INVALID");
            }
            i.messages.push((peer.clone(), html.to_string()));
            Ok(())
        })
    }
}
