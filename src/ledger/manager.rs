use super::{Balance, Position};
use crate::core::events::AccountSnapshot;
use crate::types::InstrumentId;
use dashmap::DashMap;
use log::debug;
use std::fmt;
use std::sync::Arc;

/// Per-connection registry of balances, one shared instance per currency
#[derive(Debug, Default)]
pub struct BalanceManager {
    balances: DashMap<String, Arc<Balance>>,
}

impl BalanceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the balance for `currency`, creating an unready one on first use
    pub fn find_balance(&self, currency: &str) -> Arc<Balance> {
        self.balances
            .entry(currency.to_string())
            .or_insert_with(|| Arc::new(Balance::new(currency)))
            .clone()
    }

    pub fn get(&self, currency: &str) -> Option<Arc<Balance>> {
        self.balances.get(currency).map(|b| b.clone())
    }

    pub fn currencies(&self) -> Vec<String> {
        let mut currencies: Vec<String> = self.balances.iter().map(|e| e.key().clone()).collect();
        currencies.sort();
        currencies
    }

    pub fn apply_account_snapshot(&self, snapshot: &AccountSnapshot) {
        for entry in &snapshot.balances {
            self.find_balance(&entry.currency)
                .apply_snapshot(entry.available, snapshot.timestamp);
        }
        debug!("[balances] applied {} balance(s) at {}", snapshot.balances.len(), snapshot.timestamp);
    }
}

impl fmt::Display for BalanceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for currency in self.currencies() {
            if let Some(balance) = self.get(&currency) {
                writeln!(f, "{}", balance)?;
            }
        }
        Ok(())
    }
}

/// Per-connection registry of derivative positions
#[derive(Debug, Default)]
pub struct PositionManager {
    positions: DashMap<InstrumentId, Arc<Position>>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_position(&self, instrument_id: &InstrumentId) -> Arc<Position> {
        self.positions
            .entry(instrument_id.clone())
            .or_insert_with(|| Arc::new(Position::new(instrument_id.clone())))
            .clone()
    }

    /// Positions absent from the snapshot are flat
    pub fn apply_account_snapshot(&self, snapshot: &AccountSnapshot) {
        for entry in &snapshot.positions {
            self.find_position(&entry.instrument_id)
                .apply_snapshot(entry.long, entry.short, snapshot.timestamp);
        }
        for position in self.positions.iter() {
            if !snapshot.positions.iter().any(|p| &p.instrument_id == position.key()) {
                position.apply_snapshot(Default::default(), Default::default(), snapshot.timestamp);
            }
        }
    }
}
