use crate::ui;
use alloy::primitives::Address;
use betlink::{
    bets::{
        BetView,
        CategoryFilter,
        DashboardTab,
        apply_filters,
    },
    contract::{
        AlloyBetContract,
        ContractConfig,
    },
    fetch::{
        BetQuery,
        ListState,
        ListUpdate,
        Listing,
        RetryPolicy,
        ViewWorker,
    },
    mutations::{
        CreateBetForm,
        Mutation,
        MutationError,
        Winner,
        prepare_expiry_check,
        prepare_join,
        prepare_resolve,
        submit,
    },
    prefs::{
        ConnectionIntent,
        IntentUpdate,
        SessionStore,
        intent_update,
    },
    provider::WalletProvider,
    session::{
        ConnectError,
        SessionState,
        WalletSession,
    },
    wallets::{
        KeystoreWallet,
        prompt_unlock,
    },
};
use chrono::Utc;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use std::{
    path::PathBuf,
    time::Duration,
};
use tokio::{
    sync::{
        broadcast,
        mpsc,
    },
    time,
};
use tracing::{
    debug,
    error,
    info,
    warn,
};

const MAX_ERRORS: usize = 50;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub contract: ContractConfig,
    pub wallet_dir: PathBuf,
    pub wallet: Option<String>,
    pub reconcile_interval: Duration,
    pub refresh_interval: Duration,
    pub state_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Screen {
    #[default]
    Explore,
    Resolve,
    Dashboard,
}

impl Screen {
    pub const ALL: [Screen; 3] = [Screen::Explore, Screen::Resolve, Screen::Dashboard];

    pub fn label(self) -> &'static str {
        match self {
            Screen::Explore => "Explore",
            Screen::Resolve => "Resolve",
            Screen::Dashboard => "Dashboard",
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub screen: Screen,
    pub session: SessionState,
    pub wallet_name: Option<String>,
    pub list: ListState,
    /// Bets after search and category filtering, in display order.
    pub rows: Vec<BetView>,
    pub selected: usize,
    pub search: String,
    pub category: CategoryFilter,
    pub tab: DashboardTab,
    pub now: u64,
    pub status: String,
    pub errors: Vec<String>,
}

enum Action {
    Create(CreateBetForm),
    Join,
    Resolve(Winner),
    CheckExpiry,
}

pub struct AppController {
    config: AppConfig,
    session: WalletSession<KeystoreWallet>,
    reader: AlloyBetContract,
    store: SessionStore,
    screen: Screen,
    list: ListState,
    generation: u64,
    worker: Option<ViewWorker>,
    updates_tx: mpsc::UnboundedSender<ListUpdate>,
    watched_account: Option<Address>,
    search: String,
    category: CategoryFilter,
    tab: DashboardTab,
    selected: usize,
    status: String,
    errors: Vec<String>,
}

impl AppController {
    pub fn new(
        config: AppConfig,
        updates_tx: mpsc::UnboundedSender<ListUpdate>,
    ) -> Result<Self> {
        let reader = AlloyBetContract::new(config.contract.clone())
            .wrap_err("Failed to set up the betting contract client")?;
        let wallet = KeystoreWallet::new(
            config.wallet_dir.clone(),
            reader.rpc(),
            config.wallet.as_deref(),
        )?;
        let store = SessionStore::new(&config.state_dir)?;
        Ok(Self {
            config,
            session: WalletSession::new(wallet),
            reader,
            store,
            screen: Screen::default(),
            list: ListState::Loading,
            generation: 0,
            worker: None,
            updates_tx,
            watched_account: None,
            search: String::new(),
            category: CategoryFilter::default(),
            tab: DashboardTab::default(),
            selected: 0,
            status: String::new(),
            errors: Vec::new(),
        })
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
        self.errors.clear();
    }

    fn push_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.errors.push(message);
        if self.errors.len() > MAX_ERRORS {
            let drain = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..drain);
        }
    }

    /// Reconnects the keystore remembered from the last run. Runs before the
    /// terminal UI takes over stdin.
    async fn restore_intent(&mut self) -> Result<()> {
        let intent = match self.store.load() {
            Ok(Some(intent)) => intent,
            Ok(None) => return Ok(()),
            Err(err) => {
                warn!(?err, "discarding unreadable session file");
                return self.store.forget();
            }
        };
        let descriptor = match self.session.provider().select(&intent.wallet) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                warn!(?err, wallet = %intent.wallet, "remembered keystore is gone");
                return self.store.forget();
            }
        };
        let password = tokio::task::spawn_blocking(move || prompt_unlock(&descriptor))
            .await
            .wrap_err("password prompt task failed")??;
        if password.is_empty() {
            info!("skipping reconnect of remembered wallet");
            return Ok(());
        }
        self.connect(password).await;
        Ok(())
    }

    /// Turns session notices into status lines and follows account changes.
    fn sync_session(&mut self) {
        for notice in self.session.drain_notices() {
            if notice.is_error() {
                self.push_error(notice.message());
            } else {
                self.set_status(notice.message());
            }
            match intent_update(&notice) {
                Some(IntentUpdate::Remember(account)) => self.remember(account),
                Some(IntentUpdate::Forget) => self.forget(),
                None => {}
            }
        }
        let account = self.session.state().account;
        if account != self.watched_account {
            debug!(?account, "account changed, reloading bets");
            self.watched_account = account;
            self.restart_worker();
        }
    }

    fn remember(&mut self, account: Address) {
        let Some(wallet) = self.session.provider().selected() else {
            return;
        };
        if let Err(err) = self.store.remember(&ConnectionIntent::new(wallet.name, account)) {
            self.push_error(format!("Failed to save session: {err}"));
        }
    }

    fn forget(&mut self) {
        if let Err(err) = self.store.forget() {
            self.push_error(format!("Failed to clear saved session: {err}"));
        }
    }

    fn query(&self) -> Option<BetQuery> {
        let viewer = self.session.state().account;
        match self.screen {
            Screen::Explore => Some(BetQuery::Explore { viewer }),
            Screen::Resolve => Some(BetQuery::Resolve { viewer }),
            Screen::Dashboard => viewer.map(|account| BetQuery::Dashboard {
                account,
                tab: self.tab,
            }),
        }
    }

    fn restart_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
        self.generation += 1;
        self.selected = 0;
        let Some(query) = self.query() else {
            self.list = ListState::Ready(Listing::default());
            return;
        };
        self.list = ListState::Loading;
        self.worker = Some(ViewWorker::spawn(
            self.reader.clone(),
            query,
            self.generation,
            RetryPolicy::default(),
            self.config.refresh_interval,
            self.updates_tx.clone(),
        ));
    }

    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
    }

    fn apply_update(&mut self, update: ListUpdate) -> bool {
        let current = self.worker.as_ref().map(ViewWorker::generation);
        if current != Some(update.generation) {
            debug!(
                generation = update.generation,
                ?current,
                "dropping update from a stopped view"
            );
            return false;
        }
        if let ListState::Failed { message } = &update.state {
            warn!(%message, "bet list fetch failed");
        }
        self.list = update.state;
        self.clamp_selection();
        true
    }

    fn fetch_now(&self) {
        if let Some(worker) = &self.worker {
            worker.fetch_now();
        }
    }

    fn switch_screen(&mut self, screen: Screen) {
        if self.screen == screen {
            return;
        }
        self.screen = screen;
        self.restart_worker();
    }

    fn rows(&self) -> Vec<BetView> {
        match self.screen {
            Screen::Explore | Screen::Resolve => {
                apply_filters(self.list.bets(), self.category, &self.search)
            }
            Screen::Dashboard => self.list.bets().to_vec(),
        }
    }

    fn clamp_selection(&mut self) {
        let len = self.rows().len();
        self.selected = self.selected.min(len.saturating_sub(1));
    }

    fn select_next(&mut self) {
        let len = self.rows().len();
        if len > 0 {
            self.selected = (self.selected + 1) % len;
        }
    }

    fn select_prev(&mut self) {
        let len = self.rows().len();
        if len > 0 {
            self.selected = (self.selected + len - 1) % len;
        }
    }

    fn selected_bet(&self) -> Result<BetView, MutationError> {
        self.rows()
            .get(self.selected)
            .cloned()
            .ok_or_else(|| MutationError::Unauthorized("No bet selected".to_string()))
    }

    fn now() -> u64 {
        u64::try_from(Utc::now().timestamp()).unwrap_or_default()
    }

    fn build_snapshot(&self) -> AppSnapshot {
        AppSnapshot {
            screen: self.screen,
            session: self.session.snapshot(),
            wallet_name: self.session.provider().selected().map(|w| w.name),
            list: self.list.clone(),
            rows: self.rows(),
            selected: self.selected,
            search: self.search.clone(),
            category: self.category,
            tab: self.tab,
            now: Self::now(),
            status: self.status.clone(),
            errors: self.errors.clone(),
        }
    }

    async fn connect(&mut self, password: String) {
        if let Err(err) = self.session.connect(password).await {
            match unreported_connect_error(&err) {
                Some(message) => self.push_error(message),
                None => debug!(%err, "connect attempt failed"),
            }
        }
        self.sync_session();
    }

    async fn disconnect(&mut self) {
        self.session.disconnect().await;
        self.forget();
        self.sync_session();
    }

    fn next_wallet(&mut self) {
        let provider = self.session.provider();
        let dir = provider.dir().display().to_string();
        let result = provider
            .next_wallet_name()
            .and_then(|name| name.map(|n| provider.select(&n)).transpose());
        match result {
            Ok(Some(wallet)) => self.set_status(format!("Selected keystore {}", wallet.name)),
            Ok(None) => self.push_error(format!("No keystores found in {dir}")),
            Err(err) => self.push_error(format!("Keystore switch failed: {err}")),
        }
    }

    async fn prepare(&self, action: &Action) -> Result<Mutation, MutationError> {
        let viewer = self.session.state().account;
        let chain_id = self.config.contract.chain_id;
        match action {
            Action::Create(form) => {
                viewer.ok_or(MutationError::NotConnected)?;
                let call = form.validate(Utc::now(), chain_id)?;
                Ok(Mutation::Create(call))
            }
            Action::Join => {
                let bet = self.selected_bet()?;
                prepare_join(&bet, viewer, chain_id, Self::now()).map(Mutation::Join)
            }
            Action::Resolve(winner) => {
                let bet = self.selected_bet()?;
                prepare_resolve(&self.reader, &bet, viewer, *winner, chain_id)
                    .await
                    .map(Mutation::Resolve)
            }
            Action::CheckExpiry => {
                let bet = self.selected_bet()?;
                prepare_expiry_check(&bet, viewer, Self::now()).map(Mutation::CheckExpiry)
            }
        }
    }

    async fn perform(&mut self, action: Action, ui_state: &mut ui::UiState) -> Result<()> {
        let mutation = match self.prepare(&action).await {
            Ok(mutation) => mutation,
            Err(err) => {
                self.push_error(err.to_string());
                return Ok(());
            }
        };
        let Some(signer) = self.session.provider().signer() else {
            self.push_error(MutationError::NotConnected.to_string());
            return Ok(());
        };
        let description = mutation.describe();
        show_processing_status(self, ui_state, format!("{description}..."))?;

        let writer = self.reader.with_signer(signer);
        match submit(&writer, mutation).await {
            Ok(outcome) => {
                self.set_status(format!("{description}: confirmed in {}", outcome.tx_hash));
                if matches!(action, Action::Create(_)) {
                    ui_state.close_form();
                    self.switch_screen(Screen::Dashboard);
                }
                self.fetch_now();
                self.session.refresh().await;
                self.sync_session();
            }
            Err(err) => self.push_error(format!("{description} failed: {err}")),
        }
        Ok(())
    }

    /// Applies one input event. Returns false when the user asked to quit.
    async fn handle_input(
        &mut self,
        event: ui::UserEvent,
        ui_state: &mut ui::UiState,
    ) -> Result<bool> {
        match event {
            ui::UserEvent::Quit => return Ok(false),
            ui::UserEvent::Redraw => {}
            ui::UserEvent::SwitchScreen(screen) => self.switch_screen(screen),
            ui::UserEvent::SelectNext => self.select_next(),
            ui::UserEvent::SelectPrev => self.select_prev(),
            ui::UserEvent::SearchChanged(query) => {
                self.search = query;
                self.clamp_selection();
            }
            ui::UserEvent::CycleCategory => {
                self.category = self.category.cycle();
                self.clamp_selection();
            }
            ui::UserEvent::NextTab => {
                if self.screen == Screen::Dashboard {
                    self.tab = self.tab.next();
                    self.restart_worker();
                }
            }
            ui::UserEvent::Connect { password } => {
                show_processing_status(self, ui_state, "Connecting wallet...")?;
                self.connect(password).await;
            }
            ui::UserEvent::Disconnect => self.disconnect().await,
            ui::UserEvent::NextWallet => {
                self.next_wallet();
                self.session.refresh().await;
                self.sync_session();
            }
            ui::UserEvent::Reload => self.restart_worker(),
            ui::UserEvent::Join => self.perform(Action::Join, ui_state).await?,
            ui::UserEvent::Resolve(winner) => {
                self.perform(Action::Resolve(winner), ui_state).await?
            }
            ui::UserEvent::CheckExpiry => self.perform(Action::CheckExpiry, ui_state).await?,
            ui::UserEvent::SubmitCreate(form) => {
                self.perform(Action::Create(form), ui_state).await?
            }
        }
        Ok(true)
    }
}

fn show_processing_status(
    controller: &mut AppController,
    ui_state: &mut ui::UiState,
    message: impl Into<String>,
) -> Result<()> {
    controller.set_status(message);
    ui::draw(ui_state, &controller.build_snapshot()).wrap_err("draw while processing failed")
}

/// Connect failures the session does not turn into a notice of its own.
fn unreported_connect_error(err: &ConnectError) -> Option<String> {
    match err {
        ConnectError::InvalidPhase(_) => Some(format!("Connection refused: {err}")),
        ConnectError::NotInstalled
        | ConnectError::NetworkUnavailable
        | ConnectError::Provider(_) => None,
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let mut controller = AppController::new(config, updates_tx)?;
    controller.session.initialize().await;
    controller.restore_intent().await?;

    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    info!("UI ready");
    let res = run_loop(controller, &mut ui_state, &mut input_events, updates_rx).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop(
    mut controller: AppController,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
    mut updates_rx: mpsc::UnboundedReceiver<ListUpdate>,
) -> Result<()> {
    info!("Running app loop");
    let mut provider_events = controller.session.provider().subscribe();
    let mut reconcile = time::interval(controller.config.reconcile_interval);
    reconcile.tick().await;

    controller.watched_account = controller.session.state().account;
    controller.restart_worker();
    ui::draw(ui_state, &controller.build_snapshot()).wrap_err("initial draw failed")?;

    loop {
        tokio::select! {
            _ = reconcile.tick() => {
                controller.session.refresh().await;
                controller.sync_session();
            }
            event = provider_events.recv() => {
                match event {
                    Ok(event) => {
                        controller.session.handle_event(event).await;
                        controller.sync_session();
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "provider events lagged, polling instead");
                        controller.session.refresh().await;
                        controller.sync_session();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        provider_events = controller.session.provider().subscribe();
                    }
                }
            }
            update = updates_rx.recv() => {
                let Some(update) = update else {
                    warn!("view update channel closed");
                    break;
                };
                if !controller.apply_update(update) {
                    continue;
                }
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                if !controller.handle_input(ev, ui_state).await? {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
        ui::draw(ui_state, &controller.build_snapshot()).wrap_err("draw failed")?;
    }

    controller.stop_worker();
    info!("app loop finished");
    Ok(())
}
