//! Per-feed freshness flags and the watchdog tasks that clear them.
//!
//! Each gating feed owns one flag and one watchdog. A message marks the flag
//! fresh and restarts the watchdog's timer; a silent window clears the flag
//! and asks the adapter to resubscribe. Watchdogs never share state, so a
//! stalled feed cannot hold up another.

use crate::core::events::PriceLimitUpdate;
use crate::core::StopSignal;
use crate::traits::{ExchangeAdapter, FeedCallback, FeedKind, Subscription};
use crate::types::{InstrumentId, ProductType};
use log::{debug, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

/// Feeds that gate market readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    Depth,
    MarkPrice,
    PriceLimit,
    FundingRate,
}

impl Feed {
    pub const ALL: [Feed; 4] = [Feed::Depth, Feed::MarkPrice, Feed::PriceLimit, Feed::FundingRate];

    fn index(self) -> usize {
        match self {
            Feed::Depth => 0,
            Feed::MarkPrice => 1,
            Feed::PriceLimit => 2,
            Feed::FundingRate => 3,
        }
    }

    pub fn kind(self) -> FeedKind {
        match self {
            Feed::Depth => FeedKind::Depth,
            Feed::MarkPrice => FeedKind::MarkPrice,
            Feed::PriceLimit => FeedKind::PriceLimit,
            Feed::FundingRate => FeedKind::FundingRate,
        }
    }

    /// Feeds whose freshness a product type requires
    pub fn required_for(product: ProductType) -> &'static [Feed] {
        match product {
            ProductType::Spot => &[Feed::Depth],
            ProductType::Futures | ProductType::Perpetual => &Feed::ALL,
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// Point-in-time copy of the four freshness flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagSnapshot {
    pub depth: bool,
    pub mark_price: bool,
    pub price_limit: bool,
    pub funding_rate: bool,
}

impl FlagSnapshot {
    pub fn get(&self, feed: Feed) -> bool {
        match feed {
            Feed::Depth => self.depth,
            Feed::MarkPrice => self.mark_price,
            Feed::PriceLimit => self.price_limit,
            Feed::FundingRate => self.funding_rate,
        }
    }

    pub fn ready_for(&self, product: ProductType) -> bool {
        Feed::required_for(product).iter().all(|feed| self.get(*feed))
    }

    /// Empty when ready, otherwise every stale required feed
    pub fn unready_reason(&self, product: ProductType) -> String {
        Feed::required_for(product)
            .iter()
            .filter(|feed| !self.get(**feed))
            .map(|feed| format!("{} not ready", feed))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for FlagSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "depth_ok:{} mark_price_ok:{} price_limit_ok:{} funding_ok:{}",
            self.depth, self.mark_price, self.price_limit, self.funding_rate
        )
    }
}

/// Live freshness flags. Each flag is written by the feed callback and its watchdog only.
#[derive(Debug, Default)]
pub struct FeedFlags {
    flags: [AtomicBool; 4],
    touched: [Notify; 4],
}

impl FeedFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, feed: Feed) -> bool {
        self.flags[feed.index()].load(Ordering::Acquire)
    }

    pub fn set(&self, feed: Feed, fresh: bool) {
        self.flags[feed.index()].store(fresh, Ordering::Release);
    }

    /// Record a message on `feed`: set its flag and restart its watchdog
    pub fn mark_fresh(&self, feed: Feed) {
        self.set(feed, true);
        self.touched[feed.index()].notify_one();
    }

    fn touched(&self, feed: Feed) -> &Notify {
        &self.touched[feed.index()]
    }

    pub fn snapshot(&self) -> FlagSnapshot {
        FlagSnapshot {
            depth: self.get(Feed::Depth),
            mark_price: self.get(Feed::MarkPrice),
            price_limit: self.get(Feed::PriceLimit),
            funding_rate: self.get(Feed::FundingRate),
        }
    }
}

/// Clear `feed` and reset its subscription whenever it stays silent for `timeout`
pub(crate) fn spawn_staleness_watchdog(
    feed: Feed,
    timeout: Duration,
    flags: Arc<FeedFlags>,
    subscription: Arc<dyn Subscription>,
    mut stop: StopSignal,
    log_prefix: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let deadline = sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                _ = flags.touched(feed).notified() => {
                    deadline.as_mut().reset(Instant::now() + timeout);
                }
                _ = &mut deadline => {
                    flags.set(feed, false);
                    warn!("{} {} silent for {:?}, resubscribing", log_prefix, feed, timeout);
                    subscription.reset();
                    deadline.as_mut().reset(Instant::now() + timeout);
                }
            }
        }
        debug!("{} {} watchdog stopped", log_prefix, feed);
    })
}

/// Price-limit watchdog: the venue does not guarantee a push cadence, so after
/// `poll` of silence the limits are fetched over REST; after `timeout` without
/// any update the flag is cleared and the channel resubscribed.
#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_price_limit_watchdog(
    poll: Duration,
    timeout: Duration,
    flags: Arc<FeedFlags>,
    subscription: Arc<dyn Subscription>,
    adapter: Arc<dyn ExchangeAdapter>,
    instrument_id: InstrumentId,
    apply: FeedCallback<PriceLimitUpdate>,
    mut stop: StopSignal,
    log_prefix: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let poll_deadline = sleep(poll);
        let hard_deadline = sleep(timeout);
        tokio::pin!(poll_deadline);
        tokio::pin!(hard_deadline);
        // A slow REST call must not hold up shutdown or the hard timeout
        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                _ = flags.touched(Feed::PriceLimit).notified() => {
                    poll_deadline.as_mut().reset(Instant::now() + poll);
                    hard_deadline.as_mut().reset(Instant::now() + timeout);
                }
                _ = &mut poll_deadline => {
                    if in_flight.as_ref().map_or(true, |poll| poll.is_finished()) {
                        in_flight = Some(spawn_price_limit_poll(
                            adapter.clone(),
                            instrument_id.clone(),
                            apply.clone(),
                            log_prefix.clone(),
                        ));
                    }
                    poll_deadline.as_mut().reset(Instant::now() + poll);
                }
                _ = &mut hard_deadline => {
                    flags.set(Feed::PriceLimit, false);
                    warn!("{} price limit silent for {:?}, resubscribing", log_prefix, timeout);
                    subscription.reset();
                    hard_deadline.as_mut().reset(Instant::now() + timeout);
                }
            }
        }
        if let Some(poll) = in_flight {
            poll.abort();
        }
        debug!("{} price limit watchdog stopped", log_prefix);
    })
}

/// One REST fetch; a successful result goes through the push callback so it
/// refreshes the flag and both timers like a streamed update
fn spawn_price_limit_poll(
    adapter: Arc<dyn ExchangeAdapter>,
    instrument_id: InstrumentId,
    apply: FeedCallback<PriceLimitUpdate>,
    log_prefix: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match adapter.fetch_price_limit(&instrument_id).await {
            Ok(update) => {
                debug!("{} price limit refreshed over REST", log_prefix);
                apply(update);
            }
            Err(e) => debug!("{} price limit REST poll failed: {}", log_prefix, e),
        }
    })
}
