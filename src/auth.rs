use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::api::{SessionAuthority, SignIn};
use crate::config::AppConfig;
use crate::telegram::TelegramClient;

/// Source of answers for the interactive login.
pub trait Prompt {
    fn ask(&mut self, label: &str) -> Result<String>;

    /// Ask without echoing the input.
    fn ask_secret(&mut self, label: &str) -> Result<String>;
}

/// Reads answers from the terminal.
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn ask(&mut self, label: &str) -> Result<String> {
        print!("{label}");
        io::stdout().flush().context("failed to flush stdout")?;
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("failed to read from stdin")?;
        Ok(line.trim().to_string())
    }

    fn ask_secret(&mut self, label: &str) -> Result<String> {
        let value = rpassword::prompt_password(label).context("failed to read password")?;
        Ok(value.trim().to_string())
    }
}

fn non_empty(value: String, what: &str) -> Result<String> {
    if value.is_empty() {
        bail!("{what} cannot be empty");
    }
    Ok(value)
}

/// Log in interactively and return the exported session string.
pub async fn login<A, P>(authority: &A, prompt: &mut P) -> Result<String>
where
    A: SessionAuthority + ?Sized,
    P: Prompt,
{
    let phone = non_empty(prompt.ask("Phone number (international format): ")?, "phone number")?;
    authority
        .send_code(&phone)
        .await
        .context("failed to request login code")?;

    let code = non_empty(prompt.ask("Login code: ")?, "login code")?;
    match authority
        .sign_in(&code)
        .await
        .context("sign-in failed")?
    {
        SignIn::Authorized => {}
        SignIn::PasswordRequired => {
            let password = non_empty(
                prompt.ask_secret("Two-step verification password: ")?,
                "password",
            )?;
            authority
                .check_password(&password)
                .await
                .context("password check failed")?;
        }
    }

    authority
        .export_session()
        .await
        .context("failed to export session")
}

/// Open a fresh connection and run the terminal login.
pub async fn bootstrap_session(config: &AppConfig) -> Result<String> {
    let client = TelegramClient::connect(config.app_id, &config.app_hash);
    info!("Connected with app id {}, starting login", config.app_id);
    let session = login(&client, &mut TerminalPrompt).await?;
    info!("Successfully authenticated session");
    Ok(session)
}
