use anyhow::{Context, Result, bail};
use async_trait::async_trait;

use crate::types::{GiftInvoice, InputPeer, PaymentForm, PaymentResult, SavedGift, StarGifts};

/// Marketplace operations the bot depends on.
#[async_trait]
pub trait GiftMarket: Send + Sync {
    /// Fetch the gift catalog. `hash` is the change-token from the previous reply (0 on first poll).
    async fn star_gifts(&self, hash: i32) -> Result<StarGifts>;

    /// List gifts held by the acting account.
    async fn saved_star_gifts(&self) -> Result<Vec<SavedGift>>;

    async fn resolve_peer(&self, peer: &str) -> Result<InputPeer>;

    async fn payment_form(&self, invoice: &GiftInvoice) -> Result<PaymentForm>;

    async fn send_stars_form(&self, form_id: i64, invoice: &GiftInvoice) -> Result<PaymentResult>;

    /// Upgrade a held gift identified by the message that delivered it.
    async fn upgrade_star_gift(&self, msg_id: i32) -> Result<()>;

    /// Send an HTML-formatted message.
    async fn send_message(&self, peer: &InputPeer, html: &str) -> Result<()>;
}

/// Outcome of submitting a login code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignIn {
    Authorized,
    PasswordRequired,
}

/// Login operations used once to mint a session.
///
/// Calls are made in order on one connection; the implementation keeps the
/// pending login between them.
#[async_trait]
pub trait SessionAuthority: Send + Sync {
    /// Request a login code for `phone`.
    async fn send_code(&self, phone: &str) -> Result<()>;

    /// Submit the code received for the last `send_code`.
    async fn sign_in(&self, code: &str) -> Result<SignIn>;

    async fn check_password(&self, password: &str) -> Result<()>;

    /// Export the now-authorized session as a portable string.
    async fn export_session(&self) -> Result<String>;
}

/// Buy one gift for `recipient`.
///
/// Resolves the recipient, requests a payment form for the invoice and pays it.
/// Nothing is rolled back when a later step fails.
pub async fn purchase_gift<M>(
    market: &M,
    recipient: &str,
    gift_id: i64,
    upgradable: bool,
    note: Option<&str>,
) -> Result<PaymentResult>
where
    M: GiftMarket + ?Sized,
{
    let peer = market
        .resolve_peer(recipient)
        .await
        .with_context(|| format!("failed to resolve recipient {recipient}"))?;

    let invoice = GiftInvoice {
        peer,
        gift_id,
        include_upgrade: upgradable,
        hide_name: false,
        message: note.map(str::to_string),
    };

    let form = market
        .payment_form(&invoice)
        .await
        .with_context(|| format!("failed to get payment form for gift {gift_id}"))?;
    let form_id = match form {
        PaymentForm::StarGift { form_id } => form_id,
        PaymentForm::Other => bail!("unexpected payment form kind for gift {gift_id}"),
    };

    let result = market
        .send_stars_form(form_id, &invoice)
        .await
        .with_context(|| format!("failed to pay form {form_id} for gift {gift_id}"))?;
    if let PaymentResult::VerificationNeeded { url } = &result {
        bail!("payment for gift {gift_id} needs verification at {url}");
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeMarket;

    #[tokio::test]
    async fn purchase_resolves_then_pays() {
        let market = FakeMarket::new();
        purchase_gift(&market, "buyer", 3, true, Some("auto-buy"))
            .await
            .unwrap();

        assert_eq!(market.resolved(), vec!["buyer".to_string()]);
        let paid = market.paid_invoices();
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].gift_id, 3);
        assert!(paid[0].include_upgrade);
        assert_eq!(paid[0].message.as_deref(), Some("auto-buy"));
    }

    #[tokio::test]
    async fn purchase_stops_when_resolution_fails() {
        let market = FakeMarket::new();
        market.fail_resolution("ghost");
        let err = purchase_gift(&market, "ghost", 3, false, None).await.unwrap_err();
        assert!(err.to_string().contains("ghost"));
        assert!(market.purchase_attempts().is_empty());
    }

    #[tokio::test]
    async fn purchase_needing_verification_fails() {
        let market = FakeMarket::new();
        market.require_verification("https://t.me/verify");
        let err = purchase_gift(&market, "buyer", 3, false, None).await.unwrap_err();
        assert!(err.to_string().contains("https://t.me/verify"), "{err}");
        assert!(market.paid_invoices().is_empty());
    }

    #[tokio::test]
    async fn purchase_rejects_unexpected_form() {
        let market = FakeMarket::new();
        market.set_unexpected_form(true);
        assert!(purchase_gift(&market, "buyer", 3, false, None).await.is_err());
        assert!(market.paid_invoices().is_empty());
    }
}
