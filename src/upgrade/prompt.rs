// file: src/upgrade/prompt.rs
// version: 1.0.0
// guid: 2e9b7c54-0d6a-4f13-9c82-5a4f1e8d3b07

//! Operator interaction: phase gates and credential prompts

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use secrecy::SecretString;

use crate::config::InventoryHost;
use crate::network::Credentials;
use crate::{Result, UpgradeError};

/// Source of operator answers
pub trait PromptProvider: Send + Sync {
    /// Ask a yes/no question; only an explicit yes proceeds
    fn confirm(&self, question: &str) -> Result<bool>;
    fn username(&self) -> Result<String>;
    fn password(&self) -> Result<SecretString>;
}

/// Whether an answer counts as consent
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Interactive prompts on the controlling terminal
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    pub fn new() -> Self {
        Self
    }

    fn read_line(label: &str) -> Result<String> {
        print!("{}", label);
        io::stdout().flush()?;

        let mut input = String::new();
        let read = io::stdin().lock().read_line(&mut input)?;
        if read == 0 {
            return Err(UpgradeError::prompt("Standard input closed"));
        }
        Ok(input.trim().to_string())
    }
}

/// Restores cooked mode when dropped
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode()
            .map_err(|e| UpgradeError::prompt(format!("Failed to enter raw mode: {}", e)))?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

impl PromptProvider for TerminalPrompt {
    fn confirm(&self, question: &str) -> Result<bool> {
        let answer = Self::read_line(&format!("{} (y/n): ", question))?;
        Ok(is_affirmative(&answer))
    }

    fn username(&self) -> Result<String> {
        let name = Self::read_line("Username: ")?;
        if name.is_empty() {
            return Err(UpgradeError::prompt("Username cannot be empty"));
        }
        Ok(name)
    }

    fn password(&self) -> Result<SecretString> {
        print!("Password: ");
        io::stdout().flush()?;

        let mut password = String::new();
        {
            let _raw = RawModeGuard::enable()?;
            loop {
                let ev = event::read()
                    .map_err(|e| UpgradeError::prompt(format!("Failed to read key: {}", e)))?;
                match ev {
                    Event::Key(KeyEvent {
                        kind: KeyEventKind::Release,
                        ..
                    }) => {}
                    Event::Key(KeyEvent {
                        code: KeyCode::Char('c'),
                        modifiers: KeyModifiers::CONTROL,
                        ..
                    }) => {
                        return Err(UpgradeError::prompt("Password entry interrupted"));
                    }
                    Event::Key(KeyEvent {
                        code: KeyCode::Enter,
                        ..
                    }) => break,
                    Event::Key(KeyEvent {
                        code: KeyCode::Backspace,
                        ..
                    }) => {
                        password.pop();
                    }
                    Event::Key(KeyEvent {
                        code: KeyCode::Char(c),
                        ..
                    }) => password.push(c),
                    _ => {}
                }
            }
        }
        println!();

        Ok(SecretString::from(password))
    }
}

/// Answers every gate with yes and delegates credential prompts
pub struct AssumeYes<P> {
    inner: P,
}

impl<P: PromptProvider> AssumeYes<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P: PromptProvider> PromptProvider for AssumeYes<P> {
    fn confirm(&self, question: &str) -> Result<bool> {
        tracing::info!("{} (y/n): y [--yes]", question);
        Ok(true)
    }

    fn username(&self) -> Result<String> {
        self.inner.username()
    }

    fn password(&self) -> Result<SecretString> {
        self.inner.password()
    }
}

/// Pre-recorded answers for unattended runs and tests
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<String>>,
    username: String,
    password: String,
    asked: Mutex<Vec<String>>,
    credential_prompts: Mutex<usize>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    /// Questions asked so far, in order
    pub fn questions(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Number of username and password prompts issued
    pub fn credential_prompts(&self) -> usize {
        self.credential_prompts.lock().map(|c| *c).unwrap_or_default()
    }

    fn count_credential_prompt(&self) {
        if let Ok(mut count) = self.credential_prompts.lock() {
            *count += 1;
        }
    }
}

impl PromptProvider for ScriptedPrompt {
    fn confirm(&self, question: &str) -> Result<bool> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(question.to_string());
        }
        let answer = self
            .answers
            .lock()
            .map_err(|_| UpgradeError::prompt("Answer queue poisoned"))?
            .pop_front()
            .ok_or_else(|| UpgradeError::prompt(format!("No scripted answer for \"{}\"", question)))?;
        Ok(is_affirmative(&answer))
    }

    fn username(&self) -> Result<String> {
        self.count_credential_prompt();
        Ok(self.username.clone())
    }

    fn password(&self) -> Result<SecretString> {
        self.count_credential_prompt();
        Ok(SecretString::from(self.password.clone()))
    }
}

/// Fills credentials missing from the inventory. The username and the
/// password are each prompted at most once and shared by every host
/// lacking them.
pub struct CredentialResolver<'a> {
    prompt: &'a dyn PromptProvider,
    username: Option<String>,
    password: Option<SecretString>,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(prompt: &'a dyn PromptProvider) -> Self {
        Self {
            prompt,
            username: None,
            password: None,
        }
    }

    pub fn resolve(&mut self, host: &InventoryHost) -> Result<Credentials> {
        let username = match &host.username {
            Some(name) => name.clone(),
            None => match &self.username {
                Some(name) => name.clone(),
                None => {
                    let name = self.prompt.username()?;
                    self.username = Some(name.clone());
                    name
                }
            },
        };

        let password = match &host.password {
            Some(secret) => secret.clone(),
            None => match &self.password {
                Some(secret) => secret.clone(),
                None => {
                    let secret = self.prompt.password()?;
                    self.password = Some(secret.clone());
                    secret
                }
            },
        };

        Ok(Credentials { username, password })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceIdentity;
    use secrecy::ExposeSecret;
    use std::sync::Arc;

    fn host(name: &str, username: Option<&str>, password: Option<&str>) -> InventoryHost {
        InventoryHost {
            identity: DeviceIdentity {
                name: name.into(),
                hostname: format!("{}.example.net", name),
            },
            username: username.map(str::to_string),
            password: password.map(|p| SecretString::from(p.to_string())),
            images: Arc::new(Default::default()),
        }
    }

    #[test]
    fn test_affirmative_answers() {
        assert!(is_affirmative("y"));
        assert!(is_affirmative(" Y\n"));
        assert!(is_affirmative("yes"));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("n"));
        assert!(!is_affirmative("sure"));
    }

    #[test]
    fn test_scripted_prompt_records_questions() {
        let prompt = ScriptedPrompt::new(["y", "n"]);
        assert!(prompt.confirm("Upgrade?").unwrap());
        assert!(!prompt.confirm("Reload?").unwrap());
        assert!(prompt.confirm("Again?").is_err());
        assert_eq!(prompt.questions(), vec!["Upgrade?", "Reload?", "Again?"]);
    }

    #[test]
    fn test_credentials_prompted_once() {
        let prompt = ScriptedPrompt::new(Vec::<String>::new()).with_credentials("admin", "s3cret");
        let mut resolver = CredentialResolver::new(&prompt);

        let a = resolver.resolve(&host("idf-1", None, None)).unwrap();
        let b = resolver.resolve(&host("idf-2", None, None)).unwrap();
        let c = resolver.resolve(&host("idf-3", Some("local"), Some("pw"))).unwrap();

        assert_eq!(prompt.credential_prompts(), 2);
        assert_eq!(a.username, "admin");
        assert_eq!(b.password.expose_secret(), "s3cret");
        assert_eq!(c.username, "local");
        assert_eq!(c.password.expose_secret(), "pw");
    }

    #[test]
    fn test_no_prompt_when_inventory_complete() {
        let prompt = ScriptedPrompt::default();
        let mut resolver = CredentialResolver::new(&prompt);
        resolver.resolve(&host("idf-1", Some("u"), Some("p"))).unwrap();
        assert_eq!(prompt.credential_prompts(), 0);
    }

    #[test]
    fn test_assume_yes_skips_gates() {
        let prompt = AssumeYes::new(ScriptedPrompt::default());
        assert!(prompt.confirm("Reload?").unwrap());
    }
}
