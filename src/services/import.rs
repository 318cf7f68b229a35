//! Bulk CSV imports of users and contracts. A file is validated as a whole before anything is
//! written, and all rows of an accepted file go in with one transaction.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::auth::{CryptError, generate_secret, hash_password};
use crate::model::entity::{
    AccountToken, AccountTokenCreate, Contract, ContractCreate, Referral, TokenPurpose, UserEntity,
    UserEntityCreateUpdate,
};
use crate::model::{DatabaseError, ModelManager};
use crate::services::mailer::{Mail, Mailer, deliver};
use crate::utils::csv::{self, Record};
use crate::utils::validate::looks_like_email;
use crate::web::{AuthenticatedUser, UserRole};

pub const USER_HEADER: [&str; 3] = ["email", "display_name", "role"];
pub const CONTRACT_HEADER: [&str; 4] = ["fp_email", "customer_name", "amount", "contracted_on"];

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import rejected, {} problem(s)", .0.len())]
    Rejected(Vec<String>),
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("crypt error: {0}")]
    Crypt(#[from] CryptError),
}

impl From<sqlx::Error> for ImportError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub line: usize,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    pub referral_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractRow {
    pub line: usize,
    pub fp_email: String,
    pub customer_name: String,
    pub amount: i64,
    pub contracted_on: NaiveDate,
}

#[derive(Debug, Clone, Default, Serialize, utoipa::ToSchema)]
pub struct ImportSummary {
    pub imported: usize,
    /// Rows left out because the record already exists, e.g. `line 3: a@b.c already exists`.
    pub skipped: Vec<String>,
}

fn check_header(records: &[Record], expected: &[&str]) -> Result<(), Vec<String>> {
    let Some(header) = records.first() else {
        return Err(vec![String::from("file is empty")]);
    };

    let matches = expected
        .iter()
        .enumerate()
        .all(|(i, name)| header.get(i).is_some_and(|h| h.eq_ignore_ascii_case(name)));
    if matches {
        Ok(())
    } else {
        Err(vec![format!("line {}: header must start with `{}`", header.line, expected.join(","))])
    }
}

fn split(text: &str, expected: &[&str]) -> Result<Vec<Record>, Vec<String>> {
    let records = csv::parse(text).map_err(|e| vec![e.to_string()])?;
    check_header(&records, expected)?;
    Ok(records.into_iter().skip(1).collect())
}

/// `email,display_name,role[,referral_code]`
pub fn parse_users(text: &str) -> Result<Vec<UserRow>, Vec<String>> {
    let mut problems = Vec::new();
    let mut rows = Vec::new();
    let mut seen = HashSet::new();

    for record in split(text, &USER_HEADER)? {
        let line = record.line;
        let email = record.get(0).unwrap_or_default().to_lowercase();
        let display_name = record.get(1).unwrap_or_default().to_string();
        let role = record.get(2).unwrap_or_default();
        let referral_code = record.get(3).filter(|c| !c.is_empty()).map(str::to_uppercase);

        if !looks_like_email(&email) {
            problems.push(format!("line {line}: invalid email `{email}`"));
        } else if !seen.insert(email.clone()) {
            problems.push(format!("line {line}: duplicate email `{email}` in file"));
        }
        if display_name.is_empty() {
            problems.push(format!("line {line}: display_name is empty"));
        }
        let role = match UserRole::parse_strict(role) {
            Some(role) => role,
            None => {
                problems.push(format!("line {line}: unknown role `{role}`"));
                continue;
            }
        };

        rows.push(UserRow {
            line,
            email,
            display_name,
            role,
            referral_code,
        });
    }

    if problems.is_empty() { Ok(rows) } else { Err(problems) }
}

/// `fp_email,customer_name,amount,contracted_on` with amounts in minor units and ISO dates.
pub fn parse_contracts(text: &str) -> Result<Vec<ContractRow>, Vec<String>> {
    let mut problems = Vec::new();
    let mut rows = Vec::new();

    for record in split(text, &CONTRACT_HEADER)? {
        let line = record.line;
        let fp_email = record.get(0).unwrap_or_default().to_lowercase();
        let customer_name = record.get(1).unwrap_or_default().to_string();
        let amount = record.get(2).unwrap_or_default();
        let contracted_on = record.get(3).unwrap_or_default();

        if !looks_like_email(&fp_email) {
            problems.push(format!("line {line}: invalid email `{fp_email}`"));
        }
        if customer_name.is_empty() {
            problems.push(format!("line {line}: customer_name is empty"));
        }
        let amount = match amount.parse::<i64>() {
            Ok(a) if a >= 0 => Some(a),
            _ => {
                problems.push(format!("line {line}: amount `{amount}` is not a non-negative integer"));
                None
            }
        };
        let date = match NaiveDate::parse_from_str(contracted_on, "%Y-%m-%d") {
            Ok(d) => Some(d),
            Err(_) => {
                problems.push(format!("line {line}: contracted_on `{contracted_on}` is not YYYY-MM-DD"));
                None
            }
        };

        if let (Some(amount), Some(contracted_on)) = (amount, date) {
            rows.push(ContractRow {
                line,
                fp_email,
                customer_name,
                amount,
                contracted_on,
            });
        }
    }

    if problems.is_empty() { Ok(rows) } else { Err(problems) }
}

/// Creates the users that do not exist yet. Each new user gets a random password and a
/// password-reset link by mail once the transaction has committed.
#[tracing::instrument(skip_all, fields(rows = rows.len()))]
pub async fn import_users(
    mm: &ModelManager,
    mailer: &dyn Mailer,
    public_url: &str,
    rows: Vec<UserRow>,
) -> Result<ImportSummary, ImportError> {
    let system = AuthenticatedUser::admin();

    let mut referrers = HashMap::new();
    let mut problems = Vec::new();
    for row in &rows {
        let Some(code) = &row.referral_code else {
            continue;
        };
        if referrers.contains_key(code) {
            continue;
        }
        match UserEntity::find_by_referral_code(mm, &system, code).await? {
            Some(referrer) => {
                referrers.insert(code.clone(), referrer.id());
            }
            None => problems.push(format!("line {}: unknown referral code `{code}`", row.line)),
        }
    }
    if !problems.is_empty() {
        return Err(ImportError::Rejected(problems));
    }

    let mut tx = mm.begin().await?;
    let emails: Vec<String> = rows.iter().map(|r| r.email.clone()).collect();
    let existing: HashSet<String> = UserEntity::existing_emails_in(&mut tx, &emails)
        .await?
        .into_iter()
        .collect();

    let mut summary = ImportSummary::default();
    let mut invites = Vec::new();

    for row in rows {
        if existing.contains(&row.email) {
            summary
                .skipped
                .push(format!("line {}: {} already exists", row.line, row.email));
            continue;
        }

        let password_hash = hash_password(&generate_secret())?;
        let referred_by = row
            .referral_code
            .as_ref()
            .and_then(|code| referrers.get(code).copied());

        let user = UserEntity::create_in(
            &mut tx,
            UserEntityCreateUpdate {
                email: row.email,
                display_name: row.display_name,
                password_hash,
                role: row.role,
                referred_by,
            },
        )
        .await?;

        if let Some(referrer) = referred_by {
            Referral::create_in(&mut tx, referrer, user.id()).await?;
        }

        let token = AccountToken::create_in(
            &mut tx,
            AccountTokenCreate::new(user.id(), TokenPurpose::ResetPassword),
        )
        .await?;
        invites.push((user.email().to_string(), token.token().to_string()));
        summary.imported += 1;
    }

    tx.commit().await?;

    for (email, token) in invites {
        let link = format!("{public_url}/reset-password?token={token}");
        deliver(mailer, Mail::password_reset(&email, &link)).await;
    }

    tracing::info!(imported = summary.imported, skipped = summary.skipped.len(), "users imported");
    Ok(summary)
}

/// Inserts every contract. Each row must name an existing user of tier FP or above.
#[tracing::instrument(skip_all, fields(rows = rows.len()))]
pub async fn import_contracts(mm: &ModelManager, rows: Vec<ContractRow>) -> Result<ImportSummary, ImportError> {
    let mut tx = mm.begin().await?;

    let emails: Vec<String> = rows.iter().map(|r| r.fp_email.clone()).collect();
    let fps: HashMap<String, (uuid::Uuid, UserRole)> = UserEntity::find_many_by_email_in(&mut tx, &emails)
        .await?
        .into_iter()
        .map(|u| (u.email().to_string(), (u.id(), u.role())))
        .collect();

    let mut problems = Vec::new();
    for row in &rows {
        match fps.get(&row.fp_email) {
            None => problems.push(format!("line {}: unknown user `{}`", row.line, row.fp_email)),
            Some((_, role)) if !role.at_least(UserRole::Fp) => problems.push(format!(
                "line {}: `{}` is a {role}, contracts need an fp or above",
                row.line, row.fp_email
            )),
            Some(_) => {}
        }
    }
    if !problems.is_empty() {
        return Err(ImportError::Rejected(problems));
    }

    let mut summary = ImportSummary::default();
    for row in rows {
        let Some((fp_id, _)) = fps.get(&row.fp_email) else {
            continue;
        };
        Contract::create_in(
            &mut tx,
            ContractCreate {
                fp_id: *fp_id,
                customer_name: row.customer_name,
                amount: row.amount,
                contracted_on: row.contracted_on,
            },
        )
        .await?;
        summary.imported += 1;
    }

    tx.commit().await?;
    tracing::info!(imported = summary.imported, "contracts imported");
    Ok(summary)
}
