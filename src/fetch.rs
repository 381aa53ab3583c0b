//! Polling bet lists with bounded retry and cooperative cancellation.

use crate::{
    bets::{
        BetStatus,
        BetView,
        DashboardTab,
        Portfolio,
        to_views,
    },
    contract::{
        BetReader,
        ContractError,
    },
};
use alloy::primitives::Address;
use std::{
    fmt::Display,
    future::Future,
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::{
    sync::{
        Notify,
        mpsc,
    },
    time::{
        self,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    warn,
};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15);
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch bets. Please try again later.";

/// Shared flag a view sets when it goes away. Loops check it before each
/// attempt and before publishing a result; waits race against [`CancelToken::cancelled`].
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<CancelInner>);

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.0.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn retry_message(&self, attempt: u32) -> String {
        format!(
            "Connection failed. Retrying... ({attempt}/{})",
            self.max_retries
        )
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    Done(T),
    Exhausted(E),
    Cancelled,
}

/// Runs `op` once, then up to `policy.max_retries` more times after a fixed
/// delay. `on_retry` gets the retry number before each wait.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    token: &CancelToken,
    mut on_retry: impl FnMut(u32),
    mut op: F,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut retries = 0;
    loop {
        if token.is_cancelled() {
            return RetryOutcome::Cancelled;
        }
        match op().await {
            Ok(value) => {
                if token.is_cancelled() {
                    return RetryOutcome::Cancelled;
                }
                return RetryOutcome::Done(value);
            }
            Err(err) if retries >= policy.max_retries => {
                warn!(%err, retries, "giving up after retries");
                return RetryOutcome::Exhausted(err);
            }
            Err(err) => {
                retries += 1;
                warn!(%err, retry = retries, max = policy.max_retries, "request failed, retrying");
                on_retry(retries);
                tokio::select! {
                    _ = time::sleep(policy.delay) => {}
                    _ = token.cancelled() => return RetryOutcome::Cancelled,
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BetQuery {
    Explore { viewer: Option<Address> },
    Resolve { viewer: Option<Address> },
    Dashboard { account: Address, tab: DashboardTab },
}

impl BetQuery {
    pub fn viewer(&self) -> Option<Address> {
        match self {
            BetQuery::Explore { viewer } | BetQuery::Resolve { viewer } => *viewer,
            BetQuery::Dashboard { account, .. } => Some(*account),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Listing {
    pub bets: Vec<BetView>,
    pub portfolio: Option<Portfolio>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListState {
    Loading,
    Retrying { attempt: u32, max: u32 },
    Ready(Listing),
    Failed { message: String },
}

impl ListState {
    pub fn failed(err: &ContractError) -> Self {
        let message = err.to_string();
        ListState::Failed {
            message: if message.is_empty() {
                FETCH_FAILED_MESSAGE.to_owned()
            } else {
                message
            },
        }
    }

    /// Bets to show. Empty for every state but `Ready`.
    pub fn bets(&self) -> &[BetView] {
        match self {
            ListState::Ready(listing) => &listing.bets,
            _ => &[],
        }
    }

    pub fn portfolio(&self) -> Option<&Portfolio> {
        match self {
            ListState::Ready(listing) => listing.portfolio.as_ref(),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ListState::Loading | ListState::Retrying { .. })
    }
}

/// One fetch of the list behind `query`, mapped for display.
pub async fn load<R: BetReader>(reader: &R, query: &BetQuery) -> Result<Listing, ContractError> {
    reader.check_connection().await?;
    match query {
        BetQuery::Explore { viewer } => {
            let raw = reader.active_bets().await?;
            Ok(Listing {
                bets: to_views(raw, *viewer),
                portfolio: None,
            })
        }
        BetQuery::Resolve { viewer } => {
            let raw = reader.active_bets().await?;
            let bets = to_views(raw, *viewer)
                .into_iter()
                .filter(|bet| bet.status == BetStatus::Joined)
                .collect();
            Ok(Listing {
                bets,
                portfolio: None,
            })
        }
        BetQuery::Dashboard { account, tab } => {
            let account = *account;
            let (all, scoped) = match tab {
                DashboardTab::Created => futures::try_join!(
                    reader.user_bets(account),
                    reader.bets_by_creator(account)
                )?,
                DashboardTab::Joined => futures::try_join!(
                    reader.user_bets(account),
                    reader.bets_by_joiner(account)
                )?,
                DashboardTab::Active | DashboardTab::Resolved => {
                    let all = reader.user_bets(account).await?;
                    let scoped = all.clone();
                    (all, scoped)
                }
            };
            let portfolio = Portfolio::from_bets(&to_views(all, Some(account)), account);
            let bets = to_views(scoped, Some(account))
                .into_iter()
                .filter(|bet| tab.includes(bet))
                .collect();
            Ok(Listing {
                bets,
                portfolio: Some(portfolio),
            })
        }
    }
}

#[derive(Debug)]
pub enum ViewCommand {
    FetchNow,
    Stop,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListUpdate {
    pub generation: u64,
    pub state: ListState,
}

/// Background poller for one screen's list. Dropping the screen means calling
/// [`ViewWorker::stop`]; an RPC call already in flight finishes on its own
/// and its result is discarded.
pub struct ViewWorker {
    generation: u64,
    token: CancelToken,
    commands: mpsc::UnboundedSender<ViewCommand>,
}

impl ViewWorker {
    pub fn spawn<R>(
        reader: R,
        query: BetQuery,
        generation: u64,
        policy: RetryPolicy,
        refresh: Duration,
        updates: mpsc::UnboundedSender<ListUpdate>,
    ) -> Self
    where
        R: BetReader + Send + Sync + 'static,
    {
        let token = CancelToken::new();
        let (commands, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(view_worker(
            reader,
            query,
            generation,
            policy,
            refresh,
            token.clone(),
            command_rx,
            updates,
        ));
        Self {
            generation,
            token,
            commands,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn fetch_now(&self) {
        let _ = self.commands.send(ViewCommand::FetchNow);
    }

    pub fn stop(self) {
        self.token.cancel();
        let _ = self.commands.send(ViewCommand::Stop);
    }
}

#[allow(clippy::too_many_arguments)]
async fn view_worker<R: BetReader>(
    reader: R,
    query: BetQuery,
    generation: u64,
    policy: RetryPolicy,
    refresh: Duration,
    token: CancelToken,
    mut command_rx: mpsc::UnboundedReceiver<ViewCommand>,
    updates: mpsc::UnboundedSender<ListUpdate>,
) {
    let publish = |state: ListState| -> bool {
        if token.is_cancelled() {
            return false;
        }
        updates.send(ListUpdate { generation, state }).is_ok()
    };

    let mut ticker = time::interval(refresh);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut first = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            cmd = command_rx.recv() => {
                match cmd {
                    Some(ViewCommand::FetchNow) => {}
                    Some(ViewCommand::Stop) | None => break,
                }
            }
        }
        if token.is_cancelled() {
            break;
        }
        if first && !publish(ListState::Loading) {
            break;
        }
        first = false;

        let reader_ref = &reader;
        let query_ref = &query;
        let outcome = retry(
            &policy,
            &token,
            |attempt| {
                publish(ListState::Retrying {
                    attempt,
                    max: policy.max_retries,
                });
            },
            move || load(reader_ref, query_ref),
        )
        .await;

        let delivered = match outcome {
            RetryOutcome::Done(listing) => publish(ListState::Ready(listing)),
            RetryOutcome::Exhausted(err) => publish(ListState::failed(&err)),
            RetryOutcome::Cancelled => false,
        };
        if !delivered {
            break;
        }
    }
    debug!(generation, ?query, "view worker stopped");
}
