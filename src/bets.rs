//! Read-only projections of on-chain bets for display.

use crate::{
    contract::RawBet,
    format::{
        display_date,
        display_ether,
    },
};
use alloy::primitives::{
    Address,
    U256,
};
use std::fmt;

const TITLE_SEPARATOR: &str = " - ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BetStatus {
    Open,
    Joined,
    Resolved,
    Unknown(u8),
}

impl BetStatus {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => BetStatus::Open,
            1 => BetStatus::Joined,
            2 => BetStatus::Resolved,
            other => BetStatus::Unknown(other),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BetStatus::Open => "Open",
            BetStatus::Joined => "Joined",
            BetStatus::Resolved => "Resolved",
            BetStatus::Unknown(_) => "Unknown",
        }
    }

    pub fn is_settled(self) -> bool {
        matches!(self, BetStatus::Resolved)
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Crypto,
    Sports,
    Politics,
    Finance,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Crypto,
        Category::Sports,
        Category::Politics,
        Category::Finance,
        Category::Other,
    ];

    /// Keyword guess over the bet description.
    pub fn infer(description: &str) -> Self {
        let text = description.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| text.contains(w));
        if has(&["bitcoin", "ethereum", "crypto"]) {
            Category::Crypto
        } else if has(&["championship", "world cup", "nba"]) {
            Category::Sports
        } else if has(&["president", "election"]) {
            Category::Politics
        } else if has(&["stock", "market cap"]) {
            Category::Finance
        } else {
            Category::Other
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Crypto => "Crypto",
            Category::Sports => "Sports",
            Category::Politics => "Politics",
            Category::Finance => "Finance",
            Category::Other => "Other",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(wanted) => wanted == category,
        }
    }

    pub fn cycle(self) -> Self {
        match self {
            CategoryFilter::All => CategoryFilter::Only(Category::Crypto),
            CategoryFilter::Only(current) => {
                let idx = Category::ALL
                    .iter()
                    .position(|c| *c == current)
                    .unwrap_or(0);
                Category::ALL
                    .get(idx + 1)
                    .map(|next| CategoryFilter::Only(*next))
                    .unwrap_or(CategoryFilter::All)
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CategoryFilter::All => "All",
            CategoryFilter::Only(category) => category.label(),
        }
    }
}

/// How the viewing account relates to a bet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Creator,
    Joiner,
    Resolver,
    Observer,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Creator => "Creator",
            Role::Joiner => "Joiner",
            Role::Resolver => "Resolver",
            Role::Observer => "-",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BetView {
    pub id: U256,
    pub title: String,
    pub description: String,
    pub stake: U256,
    pub stake_display: String,
    pub expiry: u64,
    pub expires_on: String,
    pub creator: Address,
    pub joiner: Option<Address>,
    pub resolver: Address,
    pub status: BetStatus,
    pub winner: Option<Address>,
    pub takers: u8,
    pub category: Category,
    pub role: Role,
}

impl BetView {
    pub fn from_raw(raw: RawBet, viewer: Option<Address>) -> Self {
        let expiry = u64::try_from(raw.expiry_timestamp).unwrap_or(u64::MAX);
        let joiner = non_zero(raw.joiner);
        let role = match viewer {
            Some(v) if v == raw.creator => Role::Creator,
            Some(v) if Some(v) == joiner => Role::Joiner,
            Some(v) if v == raw.resolver => Role::Resolver,
            _ => Role::Observer,
        };
        Self {
            id: raw.id,
            title: title_of(&raw.description).to_owned(),
            category: Category::infer(&raw.description),
            stake: raw.stake,
            stake_display: display_ether(raw.stake),
            expiry,
            expires_on: display_date(expiry),
            creator: raw.creator,
            joiner,
            resolver: raw.resolver,
            status: BetStatus::from_code(raw.status),
            winner: non_zero(raw.winner),
            takers: u8::from(joiner.is_some()),
            role,
            description: raw.description,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expiry <= now
    }

    pub fn can_join(&self, viewer: Option<Address>, now: u64) -> bool {
        match viewer {
            Some(v) => {
                v != self.creator && self.status == BetStatus::Open && !self.is_expired(now)
            }
            None => false,
        }
    }

    pub fn can_resolve(&self, viewer: Option<Address>) -> bool {
        viewer == Some(self.resolver) && self.status == BetStatus::Joined
    }

    pub fn involves(&self, account: Address) -> bool {
        self.creator == account || self.joiner == Some(account)
    }
}

pub fn to_views(raw: Vec<RawBet>, viewer: Option<Address>) -> Vec<BetView> {
    raw.into_iter()
        .map(|bet| BetView::from_raw(bet, viewer))
        .collect()
}

/// Text before the first `" - "`, or the whole description.
pub fn title_of(description: &str) -> &str {
    description
        .split(TITLE_SEPARATOR)
        .next()
        .filter(|title| !title.is_empty())
        .unwrap_or(description)
}

fn non_zero(addr: Address) -> Option<Address> {
    (!addr.is_zero()).then_some(addr)
}

/// Case-insensitive substring search over title and description.
pub fn search(bets: &[BetView], query: &str) -> Vec<BetView> {
    if query.is_empty() {
        return bets.to_vec();
    }
    let needle = query.to_lowercase();
    bets.iter()
        .filter(|bet| {
            bet.title.to_lowercase().contains(&needle)
                || bet.description.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

pub fn filter_category(bets: &[BetView], filter: CategoryFilter) -> Vec<BetView> {
    bets.iter()
        .filter(|bet| filter.matches(bet.category))
        .cloned()
        .collect()
}

pub fn apply_filters(bets: &[BetView], filter: CategoryFilter, query: &str) -> Vec<BetView> {
    search(&filter_category(bets, filter), query)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DashboardTab {
    #[default]
    Active,
    Created,
    Joined,
    Resolved,
}

impl DashboardTab {
    pub const ALL: [DashboardTab; 4] = [
        DashboardTab::Active,
        DashboardTab::Created,
        DashboardTab::Joined,
        DashboardTab::Resolved,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DashboardTab::Active => "Active",
            DashboardTab::Created => "Created",
            DashboardTab::Joined => "Joined",
            DashboardTab::Resolved => "Resolved",
        }
    }

    pub fn next(self) -> Self {
        match self {
            DashboardTab::Active => DashboardTab::Created,
            DashboardTab::Created => DashboardTab::Joined,
            DashboardTab::Joined => DashboardTab::Resolved,
            DashboardTab::Resolved => DashboardTab::Active,
        }
    }

    pub fn includes(self, bet: &BetView) -> bool {
        match self {
            DashboardTab::Active => !bet.status.is_settled(),
            DashboardTab::Resolved => bet.status.is_settled(),
            DashboardTab::Created | DashboardTab::Joined => true,
        }
    }
}

/// Totals for the dashboard overview, derived from the account's bets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Portfolio {
    pub locked: U256,
    pub winnings: U256,
    pub open_count: usize,
    pub won_count: usize,
}

impl Portfolio {
    pub fn from_bets(bets: &[BetView], account: Address) -> Self {
        let mut portfolio = Portfolio::default();
        for bet in bets.iter().filter(|bet| bet.involves(account)) {
            if bet.status.is_settled() {
                if bet.winner == Some(account) {
                    portfolio.winnings = portfolio
                        .winnings
                        .saturating_add(bet.stake.saturating_mul(U256::from(2)));
                    portfolio.won_count += 1;
                }
            } else {
                portfolio.locked = portfolio.locked.saturating_add(bet.stake);
                portfolio.open_count += 1;
            }
        }
        portfolio
    }

    pub fn locked_display(&self) -> String {
        display_ether(self.locked)
    }

    pub fn winnings_display(&self) -> String {
        display_ether(self.winnings)
    }
}
