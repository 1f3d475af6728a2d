use chrono::{DateTime, Utc};
use log::debug;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use std::fmt;

/// Provisional equity change from a fill the account snapshot has not caught up with yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TempRights {
    delta: Decimal,
    at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct BalanceState {
    available: Decimal,
    temp: Vec<TempRights>,
    snapshot_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl BalanceState {
    fn pending(&self) -> Decimal {
        self.temp.iter().map(|t| t.delta).sum()
    }

    fn rights(&self) -> Decimal {
        self.available + self.pending()
    }

    fn record(&mut self, currency: &str, delta: Decimal, at: DateTime<Utc>) {
        if matches!(self.snapshot_at, Some(snapshot_at) if at <= snapshot_at) {
            // Already covered by the snapshot we hold
            debug!("[balance-{}] temp rights {} at {} predates snapshot, ignored", currency, delta, at);
            return;
        }
        self.temp.push(TempRights { delta, at });
        self.updated_at = Some(Utc::now());
    }
}

/// Balance of one currency on one exchange connection.
///
/// Shared by every trader that references the currency. Rights equal the
/// snapshot's available amount plus the temporary adjustments recorded after
/// that snapshot.
#[derive(Debug)]
pub struct Balance {
    currency: String,
    state: Mutex<BalanceState>,
}

impl Balance {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            state: Mutex::new(BalanceState::default()),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Available amount as of the last account snapshot
    pub fn available(&self) -> Decimal {
        self.state.lock().available
    }

    /// Available plus every adjustment still waiting for a snapshot
    pub fn rights(&self) -> Decimal {
        self.state.lock().rights()
    }

    /// Sum of adjustments still waiting for an account snapshot
    pub fn pending_rights(&self) -> Decimal {
        self.state.lock().pending()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().updated_at
    }

    pub fn ready(&self) -> (bool, String) {
        if self.state.lock().snapshot_at.is_none() {
            (false, "no account snapshot received".to_string())
        } else {
            (true, String::new())
        }
    }

    /// Apply a provisional rights change from a fill at `at`.
    pub fn record_temp_rights(&self, delta: Decimal, at: DateTime<Utc>) {
        self.state.lock().record(&self.currency, delta, at);
    }

    /// Reconcile against an authoritative account snapshot taken at `at`.
    ///
    /// Adjustments recorded at or before `at` are superseded. Returns false when
    /// the snapshot is older than the one already applied.
    pub fn apply_snapshot(&self, available: Decimal, at: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        if matches!(state.snapshot_at, Some(prev) if at < prev) {
            debug!("[balance-{}] out-of-order snapshot at {} dropped", self.currency, at);
            return false;
        }
        state.available = available;
        state.temp.retain(|t| t.at > at);
        state.snapshot_at = Some(at);
        state.updated_at = Some(Utc::now());
        true
    }

    /// Lock two distinct balances in currency order, returned in argument order
    fn lock_pair<'a>(
        a: &'a Balance,
        b: &'a Balance,
    ) -> (MutexGuard<'a, BalanceState>, MutexGuard<'a, BalanceState>) {
        if (a.currency.as_str(), a as *const Balance) <= (b.currency.as_str(), b as *const Balance) {
            let first = a.state.lock();
            (first, b.state.lock())
        } else {
            let second = b.state.lock();
            (a.state.lock(), second)
        }
    }

    /// Record both legs of one deal in a single step. Readers going through
    /// [`Balance::rights_pair`] never see one leg without the other.
    pub fn apply_deal_pair(
        base: &Balance,
        base_delta: Decimal,
        quote: &Balance,
        quote_delta: Decimal,
        at: DateTime<Utc>,
    ) {
        if std::ptr::eq(base, quote) {
            let mut state = base.state.lock();
            state.record(&base.currency, base_delta, at);
            state.record(&quote.currency, quote_delta, at);
            return;
        }
        let (mut b, mut q) = Self::lock_pair(base, quote);
        b.record(&base.currency, base_delta, at);
        q.record(&quote.currency, quote_delta, at);
    }

    /// Consistent `(base, quote)` rights
    pub fn rights_pair(base: &Balance, quote: &Balance) -> (Decimal, Decimal) {
        if std::ptr::eq(base, quote) {
            let rights = base.rights();
            return (rights, rights);
        }
        let (b, q) = Self::lock_pair(base, quote);
        (b.rights(), q.rights())
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        write!(
            f,
            "{}: available={} rights={} (pending {})",
            self.currency,
            state.available,
            state.rights(),
            state.temp.len()
        )
    }
}
