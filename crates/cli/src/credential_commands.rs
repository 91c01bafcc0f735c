//! `strongbox add|list|show|edit|delete`.
//!
//! Each command stages one change in a fresh working set and commits it, so a
//! failed change is reported and dropped with the process.

use std::io::{BufRead, IsTerminal, Write};

use {
    anyhow::{Context, Result, bail},
    secrecy::{ExposeSecret, SecretString},
    serde_json::json,
    strongbox_vault::{
        BackupStatus, CommitOutcome, CommitReport, Credential, CredentialPatch, RecordId, Vault,
        WorkingSet,
    },
    tracing::warn,
};

/// Read one line from stdin as a secret, prompting when attached to a terminal.
fn read_secret(prompt: &str) -> Result<SecretString> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprint!("{prompt}: ");
        std::io::stderr().flush()?;
    }

    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .context("failed to read secret from stdin")?;
    let secret = line.trim_end_matches(['\r', '\n']).to_string();
    if secret.is_empty() {
        bail!("secret must not be empty");
    }
    Ok(SecretString::new(secret))
}

/// Surface the single outcome of a one-change commit.
fn single_outcome(report: CommitReport) -> Result<CommitOutcome> {
    if let Some(BackupStatus::Failed(reason)) = &report.backup {
        warn!(reason = %reason, "daily backup failed");
    }
    match report.outcomes.into_iter().next() {
        Some((_, CommitOutcome::Failed { reason })) => bail!("commit failed: {reason}"),
        Some((_, outcome)) => Ok(outcome),
        None => bail!("nothing was committed"),
    }
}

pub async fn add(
    vault: &Vault,
    service: String,
    username: String,
    email: Option<String>,
    notes: Option<String>,
) -> Result<()> {
    let secret = read_secret("Secret")?;
    let credential = Credential {
        service,
        username,
        secret,
        email,
        notes,
    };

    let mut set = WorkingSet::new();
    set.stage_addition(credential);
    match single_outcome(vault.commit(&mut set).await)? {
        CommitOutcome::Added(id) => println!("Added record {id}"),
        other => bail!("unexpected outcome {other:?}"),
    }
    Ok(())
}

pub async fn list(vault: &Vault, reveal: bool, as_json: bool) -> Result<()> {
    let rows = vault.view().await?;

    if as_json {
        let items: Vec<_> = rows
            .iter()
            .map(|row| {
                let mut item = json!({
                    "id": row.id,
                    "service": row.service,
                    "username": row.username,
                });
                match &row.secrets {
                    Ok(revealed) if reveal => {
                        item["secret"] = json!(revealed.secret.expose_secret());
                        item["email"] = json!(revealed.email);
                        item["notes"] = json!(revealed.notes);
                    },
                    Ok(_) => {},
                    Err(e) => item["error"] = json!(e.to_string()),
                }
                item
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No credentials stored.");
        return Ok(());
    }

    for row in &rows {
        match &row.secrets {
            Ok(revealed) if reveal => {
                println!(
                    "{:>6}  {}  {}  {}",
                    row.id,
                    row.service,
                    row.username,
                    revealed.secret.expose_secret()
                );
                if let Some(email) = &revealed.email {
                    println!("        {email}");
                }
                if let Some(notes) = &revealed.notes {
                    println!("        {notes}");
                }
            },
            Ok(_) => println!("{:>6}  {}  {}", row.id, row.service, row.username),
            Err(e) => println!(
                "{:>6}  {}  {}  [unreadable: {e}]",
                row.id, row.service, row.username
            ),
        }
    }
    Ok(())
}

pub async fn show(vault: &Vault, id: RecordId, as_json: bool) -> Result<()> {
    let credential = vault.reveal(id).await?;

    if as_json {
        let item = json!({
            "id": id,
            "service": credential.service,
            "username": credential.username,
            "secret": credential.secret.expose_secret(),
            "email": credential.email,
            "notes": credential.notes,
        });
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    println!("Id:       {id}");
    println!("Service:  {}", credential.service);
    println!("Username: {}", credential.username);
    println!("Secret:   {}", credential.secret.expose_secret());
    if let Some(email) = &credential.email {
        println!("Email:    {email}");
    }
    if let Some(notes) = &credential.notes {
        println!("Notes:    {notes}");
    }
    Ok(())
}

/// Field flags of `strongbox edit`. `email`/`notes` of `Some(None)` clear the field.
#[derive(Debug, Default)]
pub struct EditFields {
    pub service: Option<String>,
    pub username: Option<String>,
    /// Prompt for a new secret.
    pub secret: bool,
    pub email: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

pub async fn edit(vault: &Vault, id: RecordId, fields: EditFields) -> Result<()> {
    if !fields.secret
        && fields.service.is_none()
        && fields.username.is_none()
        && fields.email.is_none()
        && fields.notes.is_none()
    {
        bail!(
            "nothing to change; pass --service, --username, --secret, --email, --clear-email, \
             --notes or --clear-notes"
        );
    }

    let patch = CredentialPatch {
        service: fields.service,
        username: fields.username,
        secret: if fields.secret {
            Some(read_secret("New secret")?)
        } else {
            None
        },
        email: fields.email,
        notes: fields.notes,
    };

    let mut set = WorkingSet::new();
    set.stage_edit(id, patch)?;
    single_outcome(vault.commit(&mut set).await)?;
    println!("Updated record {id}");
    Ok(())
}

pub async fn delete(vault: &Vault, id: RecordId) -> Result<()> {
    if !vault.contains(id).await? {
        bail!("no record {id}");
    }

    let mut set = WorkingSet::new();
    set.stage_deletion(id);
    single_outcome(vault.commit(&mut set).await)?;
    println!("Deleted record {id}");
    Ok(())
}
