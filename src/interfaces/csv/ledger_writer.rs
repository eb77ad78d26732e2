use crate::domain::transaction::TransactionRecord;
use crate::domain::user::User;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct UserRow<'a> {
    user: &'a str,
    balance: String,
    customer: &'a str,
}

#[derive(Serialize)]
struct TransactionRow<'a> {
    tx: &'a str,
    user: &'a str,
    r#type: &'static str,
    status: &'static str,
    amount: i64,
    currency: &'a str,
    timestamp: String,
}

/// Writes the ledger tables as CSV.
///
/// Balances are printed in major units; transaction amounts stay in the
/// processor's minor units next to their currency.
pub struct LedgerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes `user,balance,customer` rows. Unmapped users get an empty
    /// customer column.
    pub fn write_users(&mut self, users: &[User]) -> Result<()> {
        for user in users {
            self.writer.serialize(UserRow {
                user: user.id.as_str(),
                balance: user.balance.to_string(),
                customer: user.customer.as_ref().map_or("", |c| c.as_str()),
            })?;
        }
        if users.is_empty() {
            self.writer.write_record(["user", "balance", "customer"])?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_transactions(&mut self, transactions: &[TransactionRecord]) -> Result<()> {
        for record in transactions {
            self.writer.serialize(TransactionRow {
                tx: record.id.as_str(),
                user: record.owner.as_str(),
                r#type: "deposit",
                status: record.status.as_str(),
                amount: record.amount.value(),
                currency: record.currency.as_str(),
                timestamp: record.timestamp.to_rfc3339(),
            })?;
        }
        if transactions.is_empty() {
            self.writer.write_record([
                "tx", "user", "type", "status", "amount", "currency", "timestamp",
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
