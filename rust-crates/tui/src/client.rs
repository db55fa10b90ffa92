use crate::ui;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use nova_admin::{
    AdminApi,
    ConsoleError,
    DashboardView,
    HttpAdminApi,
    PlayerRecord,
    RowHandle,
    catalog::{
        CatalogDraft,
        CatalogField,
        CatalogSection,
        ShopCatalog,
    },
    dispatch::{
        self,
        BatchReceipt,
        BatchRequest,
    },
    grid::{
        GridQuery,
        SortColumn,
        SortDirection,
    },
    model::DashboardTotals,
    refresh::{
        RefreshDisposition,
        RefreshTicket,
    },
};
use tokio::sync::mpsc;
use tracing::{
    error,
    info,
    warn,
};

const MAX_ERRORS: usize = 5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Tab {
    #[default]
    Dashboard,
    Functions,
}

/// Why the console closed; decides what happens to the stored session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    Quit,
    LoggedOut,
    SessionExpired,
}

#[derive(Clone, Debug)]
pub struct PlayerRow {
    pub record: PlayerRecord,
    pub selected: bool,
}

/// Everything the UI needs for one frame, detached from the controller.
#[derive(Clone, Debug, Default)]
pub struct AppSnapshot {
    pub tab: Tab,
    pub api_url: String,
    pub totals: DashboardTotals,
    pub rows: Vec<PlayerRow>,
    pub loading: bool,
    pub selected_count: usize,
    pub sort: SortColumn,
    pub direction: SortDirection,
    pub filter: String,
    pub catalog: Option<ShopCatalog>,
    pub catalog_dirty: bool,
    pub catalog_loading: bool,
    pub grant_pending: bool,
    pub save_pending: bool,
    pub status: String,
    pub errors: Vec<String>,
}

pub struct AppController {
    api: HttpAdminApi,
    dashboard: DashboardView,
    query: GridQuery,
    tab: Tab,
    catalog: Option<CatalogDraft>,
    catalog_generation: u64,
    catalog_pending: bool,
    grant_pending: bool,
    save_pending: bool,
    status: String,
    errors: Vec<String>,
}

/// A catalog save handed to the worker, tagged so its result can be matched to
/// the draft it was taken from.
pub struct SaveJob {
    generation: u64,
    revision: u64,
    catalog: ShopCatalog,
}

impl AppController {
    pub fn new(api: HttpAdminApi) -> Self {
        Self {
            api,
            dashboard: DashboardView::new(),
            query: GridQuery::default(),
            tab: Tab::Dashboard,
            catalog: None,
            catalog_generation: 0,
            catalog_pending: false,
            grant_pending: false,
            save_pending: false,
            status: String::new(),
            errors: Vec::new(),
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
    }

    fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        if self.errors.len() > MAX_ERRORS {
            let overflow = self.errors.len() - MAX_ERRORS;
            self.errors.drain(..overflow);
        }
    }

    fn clear_errors(&mut self) {
        self.errors.clear();
    }

    pub fn build_snapshot(&self) -> AppSnapshot {
        let (totals, rows) = match self.dashboard.snapshot() {
            Some(snapshot) => {
                let selection = self.dashboard.selection();
                let rows = self
                    .query
                    .visible(snapshot)
                    .into_iter()
                    .map(|record| PlayerRow {
                        selected: selection.is_selected(&record.row_handle),
                        record: record.clone(),
                    })
                    .collect();
                (snapshot.totals(), rows)
            }
            None => (DashboardTotals::default(), Vec::new()),
        };
        AppSnapshot {
            tab: self.tab,
            api_url: self.api.base_url().to_string(),
            totals,
            rows,
            loading: self.dashboard.is_loading(),
            selected_count: self.dashboard.selection().len(),
            sort: self.query.sort,
            direction: self.query.direction,
            filter: self.query.filter.clone(),
            catalog: self.catalog.as_ref().map(|draft| draft.catalog().clone()),
            catalog_dirty: self.catalog.as_ref().is_some_and(CatalogDraft::is_dirty),
            catalog_loading: self.catalog_pending,
            grant_pending: self.grant_pending,
            save_pending: self.save_pending,
            status: self.status.clone(),
            errors: self.errors.clone(),
        }
    }

    /// Mounts the dashboard and returns the ticket for its first load.
    pub fn open_dashboard(&mut self) -> RefreshTicket {
        self.tab = Tab::Dashboard;
        self.catalog_pending = false;
        self.set_status("Loading players...");
        self.dashboard.mount()
    }

    /// Leaves the dashboard. Returns a catalog request id when a fetch is needed.
    pub fn open_functions(&mut self) -> Option<u64> {
        self.tab = Tab::Functions;
        self.dashboard.unmount();
        if self.catalog.as_ref().is_some_and(CatalogDraft::is_dirty) {
            self.set_status("Unsaved catalog edits kept");
            return None;
        }
        Some(self.request_catalog())
    }

    fn request_catalog(&mut self) -> u64 {
        self.catalog_generation += 1;
        self.catalog_pending = true;
        self.set_status("Loading shop catalog...");
        self.catalog_generation
    }

    pub fn close(&mut self) {
        self.dashboard.unmount();
        self.catalog_pending = false;
    }

    pub fn toggle_row(&mut self, handle: &RowHandle) {
        self.dashboard.toggle(handle);
    }

    pub fn toggle_rows(&mut self, handles: &[RowHandle]) {
        self.dashboard.toggle_all(handles);
    }

    pub fn clear_selection(&mut self) {
        self.dashboard.clear_selection();
        self.set_status("Selection cleared");
    }

    pub fn cycle_sort(&mut self) {
        self.query.sort = self.query.sort.next();
    }

    pub fn toggle_sort_direction(&mut self) {
        self.query.direction = self.query.direction.toggle();
    }

    pub fn set_filter(&mut self, filter: String) {
        self.query.filter = filter;
    }

    /// Applies a finished player fetch. `AuthRequired` is passed up; anything else
    /// is reported and swallowed.
    fn apply_users(
        &mut self,
        ticket: RefreshTicket,
        result: Result<Vec<PlayerRecord>, ConsoleError>,
    ) -> Result<(), ConsoleError> {
        match self.dashboard.complete_refresh(ticket, result) {
            Ok(RefreshDisposition::Apply) => {
                let count = self.dashboard.snapshot().map_or(0, |s| s.len());
                self.set_status(format!("Loaded {count} players"));
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(ConsoleError::AuthRequired) => Err(ConsoleError::AuthRequired),
            Err(err) => {
                error!(error = %err, "player fetch failed");
                self.push_error(format!("Loading players failed: {err}"));
                Ok(())
            }
        }
    }

    fn apply_catalog(
        &mut self,
        generation: u64,
        result: Result<ShopCatalog, ConsoleError>,
    ) -> Result<(), ConsoleError> {
        if self.tab != Tab::Functions || generation != self.catalog_generation {
            tracing::debug!(generation, "discarding stale catalog response");
            return Ok(());
        }
        self.catalog_pending = false;
        match result {
            Ok(catalog) => {
                self.catalog = Some(CatalogDraft::new(catalog));
                self.set_status("Shop catalog loaded");
                Ok(())
            }
            Err(ConsoleError::AuthRequired) => Err(ConsoleError::AuthRequired),
            Err(err) => {
                error!(error = %err, "catalog fetch failed");
                self.push_error(format!("Loading shop catalog failed: {err}"));
                Ok(())
            }
        }
    }

    /// Validates the grant and marks it in flight. Returns the request for the
    /// worker, or `None` when there is nothing to send.
    pub fn begin_grant(&mut self, amount: &str) -> Option<BatchRequest> {
        if self.grant_pending {
            self.push_error("A grant is already in progress");
            return None;
        }
        match self.dashboard.prepare_grant(amount) {
            Ok(request) => {
                self.grant_pending = true;
                self.set_status(format!(
                    "Granting {} diamonds to {} player{}...",
                    request.amount(),
                    request.targets().len(),
                    plural(request.targets().len())
                ));
                Some(request)
            }
            Err(err) => {
                self.push_error(format!("Grant failed: {err}"));
                None
            }
        }
    }

    /// Applies a finished grant. On success returns the ticket of the reload the
    /// grant requires.
    fn apply_grant(
        &mut self,
        result: Result<BatchReceipt, ConsoleError>,
    ) -> Result<Option<RefreshTicket>, ConsoleError> {
        self.grant_pending = false;
        match self.dashboard.finish_grant(result) {
            Ok(outcome) => {
                self.set_status(format!(
                    "Granted {} diamonds to {} player{}",
                    outcome.receipt.amount,
                    outcome.receipt.players,
                    plural(outcome.receipt.players)
                ));
                Ok(outcome.refresh)
            }
            Err(ConsoleError::AuthRequired) => Err(ConsoleError::AuthRequired),
            Err(err) => {
                self.push_error(format!("Grant failed: {err}"));
                Ok(None)
            }
        }
    }

    pub fn request_refresh(&mut self) -> Option<RefreshTicket> {
        let ticket = self.dashboard.request_refresh();
        if ticket.is_some() {
            self.set_status("Refreshing players...");
        }
        ticket
    }

    pub fn reload_catalog(&mut self) -> u64 {
        if self.catalog.as_ref().is_some_and(CatalogDraft::is_dirty) {
            warn!("reloading catalog discards unsaved edits");
        }
        self.request_catalog()
    }

    pub fn edit_catalog(
        &mut self,
        section: CatalogSection,
        row: usize,
        field: CatalogField,
        value: &str,
    ) {
        let Some(draft) = self.catalog.as_mut() else {
            self.push_error("Shop catalog not loaded yet");
            return;
        };
        match draft.edit(section, row, field, value) {
            Ok(()) => self.set_status(format!(
                "{} row {} {} set to {} (unsaved)",
                section.title(),
                row + 1,
                field.label(),
                value.trim()
            )),
            Err(err) => self.push_error(err.to_string()),
        }
    }

    /// Takes a copy of the draft for the worker to `PUT`.
    pub fn begin_save(&mut self) -> Option<SaveJob> {
        if self.save_pending {
            self.push_error("A save is already in progress");
            return None;
        }
        if self.catalog_pending {
            self.push_error("Shop catalog is still loading");
            return None;
        }
        let Some(draft) = self.catalog.as_ref() else {
            self.push_error("Shop catalog not loaded yet");
            return None;
        };
        let job = SaveJob {
            generation: self.catalog_generation,
            revision: draft.revision(),
            catalog: draft.catalog().clone(),
        };
        self.save_pending = true;
        self.set_status("Saving shop catalog...");
        Some(job)
    }

    fn apply_save(
        &mut self,
        generation: u64,
        revision: u64,
        result: Result<(), ConsoleError>,
    ) -> Result<(), ConsoleError> {
        self.save_pending = false;
        match result {
            Ok(()) => {
                info!(generation, revision, "shop catalog saved");
                let same_draft = generation == self.catalog_generation;
                let clean = match self.catalog.as_mut() {
                    Some(draft) if same_draft => draft.mark_saved(revision),
                    _ => true,
                };
                if clean {
                    self.set_status("Shop catalog saved");
                } else {
                    self.set_status("Shop catalog saved, later edits are still unsaved");
                }
                Ok(())
            }
            Err(ConsoleError::AuthRequired) => Err(ConsoleError::AuthRequired),
            Err(err) => {
                error!(error = %err, "catalog save failed");
                self.push_error(format!("Saving shop catalog failed: {err}"));
                Ok(())
            }
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

pub async fn run_app(api: HttpAdminApi) -> Result<ExitReason> {
    let controller = AppController::new(api);
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    ui::terminal_enter(&mut ui_state)?;
    tracing::info!("UI ready");
    let res = run_loop(controller, &mut ui_state, &mut input_events).await;
    input_events.shutdown();
    ui::terminal_exit()?;
    res
}

enum ApiCommand {
    Users(RefreshTicket),
    Catalog(u64),
    Grant(BatchRequest),
    SaveCatalog(SaveJob),
    Shutdown,
}

enum ApiEvent {
    Users(RefreshTicket, Result<Vec<PlayerRecord>, ConsoleError>),
    Catalog(u64, Result<ShopCatalog, ConsoleError>),
    Granted(Result<BatchReceipt, ConsoleError>),
    Saved {
        generation: u64,
        revision: u64,
        result: Result<(), ConsoleError>,
    },
}

/// Runs every API call on its own task. The loop only ever waits on the event
/// channel, so a slow response never holds up input or a newer request.
async fn api_worker(
    api: HttpAdminApi,
    mut cmd_rx: mpsc::UnboundedReceiver<ApiCommand>,
    event_tx: mpsc::UnboundedSender<ApiEvent>,
) -> Result<()> {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            ApiCommand::Users(ticket) => {
                let api = api.clone();
                let event_tx = event_tx.clone();
                tokio::spawn(async move {
                    let result = api.list_users().await;
                    if let Err(err) = &result {
                        warn!(sequence = ticket.sequence(), error = %err, "player fetch failed");
                    }
                    let _ = event_tx.send(ApiEvent::Users(ticket, result));
                });
            }
            ApiCommand::Catalog(generation) => {
                let api = api.clone();
                let event_tx = event_tx.clone();
                tokio::spawn(async move {
                    let result = api.fetch_catalog().await;
                    let _ = event_tx.send(ApiEvent::Catalog(generation, result));
                });
            }
            ApiCommand::Grant(request) => {
                let api = api.clone();
                let event_tx = event_tx.clone();
                tokio::spawn(async move {
                    let result = dispatch::send(&api, request).await;
                    let _ = event_tx.send(ApiEvent::Granted(result));
                });
            }
            ApiCommand::SaveCatalog(job) => {
                let api = api.clone();
                let event_tx = event_tx.clone();
                tokio::spawn(async move {
                    let result = api.save_catalog(&job.catalog).await;
                    let _ = event_tx.send(ApiEvent::Saved {
                        generation: job.generation,
                        revision: job.revision,
                        result,
                    });
                });
            }
            ApiCommand::Shutdown => break,
        }
    }
    Ok(())
}

async fn run_loop(
    mut controller: AppController,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<ExitReason> {
    tracing::info!("Running app loop");
    let (api_cmd_tx, api_cmd_rx) = mpsc::unbounded_channel();
    let (api_event_tx, mut api_event_rx) = mpsc::unbounded_channel();
    let worker_handle = tokio::spawn(api_worker(
        controller.api.clone(),
        api_cmd_rx,
        api_event_tx,
    ));
    let ticket = controller.open_dashboard();
    let _ = api_cmd_tx.send(ApiCommand::Users(ticket));
    ui::draw(ui_state, &controller.build_snapshot()).wrap_err("initial draw failed")?;

    let exit = loop {
        let applied = tokio::select! {
            maybe_event = api_event_rx.recv() => {
                match maybe_event {
                    Some(ApiEvent::Users(ticket, result)) => {
                        controller.apply_users(ticket, result)
                    }
                    Some(ApiEvent::Catalog(generation, result)) => {
                        controller.apply_catalog(generation, result)
                    }
                    Some(ApiEvent::Granted(result)) => {
                        controller.apply_grant(result).map(|reload| {
                            if let Some(ticket) = reload {
                                let _ = api_cmd_tx.send(ApiCommand::Users(ticket));
                            }
                        })
                    }
                    Some(ApiEvent::Saved { generation, revision, result }) => {
                        controller.apply_save(generation, revision, result)
                    }
                    None => {
                        warn!("api worker channel closed");
                        break Err(eyre!("api worker exited unexpectedly"));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break Ok(ExitReason::Quit);
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break Ok(ExitReason::Quit),
                    ui::UserEvent::Logout => break Ok(ExitReason::LoggedOut),
                    ui::UserEvent::Redraw => Ok(()),
                    ui::UserEvent::SwitchTab(Tab::Dashboard) => {
                        controller.clear_errors();
                        let ticket = controller.open_dashboard();
                        let _ = api_cmd_tx.send(ApiCommand::Users(ticket));
                        Ok(())
                    }
                    ui::UserEvent::SwitchTab(Tab::Functions) => {
                        controller.clear_errors();
                        if let Some(generation) = controller.open_functions() {
                            let _ = api_cmd_tx.send(ApiCommand::Catalog(generation));
                        }
                        Ok(())
                    }
                    ui::UserEvent::Refresh => {
                        controller.clear_errors();
                        match controller.tab {
                            Tab::Dashboard => {
                                if let Some(ticket) = controller.request_refresh() {
                                    let _ = api_cmd_tx.send(ApiCommand::Users(ticket));
                                }
                            }
                            Tab::Functions => {
                                let generation = controller.reload_catalog();
                                let _ = api_cmd_tx.send(ApiCommand::Catalog(generation));
                            }
                        }
                        Ok(())
                    }
                    ui::UserEvent::ToggleRow(handle) => {
                        controller.toggle_row(&handle);
                        Ok(())
                    }
                    ui::UserEvent::ToggleRows(handles) => {
                        controller.toggle_rows(&handles);
                        Ok(())
                    }
                    ui::UserEvent::ClearSelection => {
                        controller.clear_selection();
                        Ok(())
                    }
                    ui::UserEvent::CycleSort => {
                        controller.cycle_sort();
                        Ok(())
                    }
                    ui::UserEvent::ToggleSortDirection => {
                        controller.toggle_sort_direction();
                        Ok(())
                    }
                    ui::UserEvent::SetFilter(filter) => {
                        controller.set_filter(filter);
                        Ok(())
                    }
                    ui::UserEvent::GrantDiamonds { amount } => {
                        controller.clear_errors();
                        if let Some(request) = controller.begin_grant(&amount) {
                            let _ = api_cmd_tx.send(ApiCommand::Grant(request));
                        }
                        Ok(())
                    }
                    ui::UserEvent::EditCatalog {
                        section,
                        row,
                        field,
                        value,
                    } => {
                        controller.clear_errors();
                        controller.edit_catalog(section, row, field, &value);
                        Ok(())
                    }
                    ui::UserEvent::SaveCatalog => {
                        controller.clear_errors();
                        if let Some(job) = controller.begin_save() {
                            let _ = api_cmd_tx.send(ApiCommand::SaveCatalog(job));
                        }
                        Ok(())
                    }
                }
            }
        };

        if let Err(err) = applied {
            debug_assert!(err.requires_login());
            warn!(error = %err, "admin API rejected the session");
            break Ok(ExitReason::SessionExpired);
        }
        ui::draw(ui_state, &controller.build_snapshot()).wrap_err("draw failed")?;
    };

    controller.close();
    let _ = api_cmd_tx.send(ApiCommand::Shutdown);
    match worker_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return Err(err).wrap_err("api worker failed"),
        Err(err) => return Err(eyre!(err)).wrap_err("api worker panicked"),
    }
    exit
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use nova_admin::{
        AuthToken,
        TelegramId,
        dispatch::Amount,
        selection::IdSet,
    };
    use std::{
        net::TcpListener,
        time::Duration,
    };

    fn offline_controller() -> AppController {
        AppController::new(HttpAdminApi::new("http://127.0.0.1:9/api").unwrap())
    }

    fn loaded_controller() -> AppController {
        let mut controller = offline_controller();
        let ticket = controller.open_dashboard();
        let mut first = PlayerRecord::new("r1", "300");
        first.package_d1 = 2;
        let second = PlayerRecord::new("r2", "100");
        controller
            .apply_users(ticket, Ok(vec![first, second]))
            .unwrap();
        controller
    }

    #[test]
    fn build_snapshot__marks_selected_rows_in_sorted_order() {
        // given
        let mut controller = loaded_controller();

        // when
        controller.toggle_row(&RowHandle::new("r1"));
        let snapshot = controller.build_snapshot();

        // then
        let rows: Vec<(&str, bool)> = snapshot
            .rows
            .iter()
            .map(|row| (row.record.row_handle.as_str(), row.selected))
            .collect();
        assert_eq!(rows, vec![("r2", false), ("r1", true)]);
        assert_eq!(snapshot.selected_count, 1);
        assert_eq!(snapshot.totals.total_users, 2);
        assert_eq!(snapshot.totals.package_d1, 2);
        assert_eq!(snapshot.status, "Loaded 2 players");
    }

    #[test]
    fn open_functions__unmounts_dashboard_and_clears_selection() {
        // given
        let mut controller = loaded_controller();
        controller.toggle_rows(&[RowHandle::new("r1"), RowHandle::new("r2")]);

        // when
        let generation = controller.open_functions();

        // then
        assert_eq!(generation, Some(1));
        assert_eq!(controller.build_snapshot().selected_count, 0);
        assert!(controller.build_snapshot().catalog_loading);
    }

    #[test]
    fn apply_users__auth_failure_is_passed_up() {
        // given
        let mut controller = offline_controller();
        let ticket = controller.open_dashboard();

        // when
        let result = controller.apply_users(ticket, Err(ConsoleError::AuthRequired));

        // then
        assert_eq!(result, Err(ConsoleError::AuthRequired));
    }

    #[test]
    fn apply_catalog__stale_response_is_ignored() {
        // given
        let mut controller = offline_controller();
        let first = controller.open_functions().unwrap();
        let second = controller.reload_catalog();

        // when
        controller
            .apply_catalog(first, Ok(ShopCatalog::default()))
            .unwrap();
        let after_stale = controller.build_snapshot();
        controller
            .apply_catalog(second, Ok(ShopCatalog::default()))
            .unwrap();

        // then
        assert!(after_stale.catalog.is_none());
        assert!(controller.build_snapshot().catalog.is_some());
    }

    #[test]
    fn edit_catalog__invalid_value_is_reported_as_error() {
        // given
        let mut controller = offline_controller();
        let generation = controller.open_functions().unwrap();
        let catalog: ShopCatalog = serde_json::from_value(serde_json::json!({
            "coinBags": [{ "id": 1, "coins": 10, "diamonds": 1 }]
        }))
        .unwrap();
        controller.apply_catalog(generation, Ok(catalog)).unwrap();

        // when
        controller.edit_catalog(CatalogSection::CoinBags, 0, CatalogField::Coins, "ten");

        // then
        let snapshot = controller.build_snapshot();
        assert!(!snapshot.catalog_dirty);
        assert_eq!(snapshot.errors.len(), 1);
    }

    fn catalog_controller() -> AppController {
        let mut controller = offline_controller();
        let generation = controller.open_functions().unwrap();
        let catalog: ShopCatalog = serde_json::from_value(serde_json::json!({
            "coinBags": [{ "id": 1, "coins": 10, "diamonds": 1 }]
        }))
        .unwrap();
        controller.apply_catalog(generation, Ok(catalog)).unwrap();
        controller
    }

    fn receipt(players: usize, amount: &str) -> BatchReceipt {
        BatchReceipt {
            players,
            amount: Amount::parse(amount).unwrap(),
        }
    }

    #[test]
    fn begin_grant__without_selection_reports_error_and_requests_nothing() {
        // given
        let mut controller = loaded_controller();

        // when
        let request = controller.begin_grant("5");

        // then
        assert!(request.is_none());
        assert!(!controller.build_snapshot().grant_pending);
        assert_eq!(
            controller.build_snapshot().errors,
            vec!["Grant failed: no players selected".to_string()]
        );
    }

    #[test]
    fn begin_grant__controller_keeps_handling_input_while_grant_is_in_flight() {
        // given
        let mut controller = loaded_controller();
        controller.toggle_row(&RowHandle::new("r1"));
        let request = controller.begin_grant("5").unwrap();

        // when
        let second = controller.begin_grant("5");
        controller.toggle_row(&RowHandle::new("r2"));
        let reload = controller.request_refresh();

        // then
        assert_eq!(request.targets(), &[TelegramId::new("300")]);
        assert!(second.is_none());
        assert!(reload.is_some());
        let snapshot = controller.build_snapshot();
        assert!(snapshot.grant_pending);
        assert_eq!(snapshot.selected_count, 2);
    }

    #[test]
    fn apply_grant__success_clears_selection_and_requests_one_reload() {
        // given
        let mut controller = loaded_controller();
        controller.toggle_rows(&[RowHandle::new("r1"), RowHandle::new("r2")]);
        controller.begin_grant("10").unwrap();

        // when
        let reload = controller.apply_grant(Ok(receipt(2, "10")));

        // then
        assert!(matches!(reload, Ok(Some(_))));
        let snapshot = controller.build_snapshot();
        assert_eq!(snapshot.selected_count, 0);
        assert!(!snapshot.grant_pending);
        assert!(snapshot.loading);
        assert_eq!(snapshot.status, "Granted 10 diamonds to 2 players");
    }

    #[test]
    fn apply_grant__failure_keeps_selection() {
        // given
        let mut controller = loaded_controller();
        controller.toggle_rows(&[RowHandle::new("r1"), RowHandle::new("r2")]);
        controller.begin_grant("10").unwrap();

        // when
        let reload = controller.apply_grant(Err(ConsoleError::network(
            "POST /users/update-diamonds",
            "timed out",
        )));

        // then
        assert_eq!(reload, Ok(None));
        let snapshot = controller.build_snapshot();
        assert_eq!(snapshot.selected_count, 2);
        assert!(!snapshot.grant_pending);
        assert_eq!(snapshot.errors.len(), 1);
    }

    #[test]
    fn apply_save__edit_made_while_saving_stays_unsaved() {
        // given
        let mut controller = catalog_controller();
        controller.edit_catalog(CatalogSection::CoinBags, 0, CatalogField::Coins, "20");
        let job = controller.begin_save().unwrap();
        controller.edit_catalog(CatalogSection::CoinBags, 0, CatalogField::Diamonds, "2");

        // when
        let refused = controller.begin_save();
        controller
            .apply_save(job.generation, job.revision, Ok(()))
            .unwrap();

        // then
        assert!(refused.is_none());
        let snapshot = controller.build_snapshot();
        assert!(snapshot.catalog_dirty);
        assert!(!snapshot.save_pending);
        assert_eq!(job.catalog.coin_bags[0].coins, 20);
        assert_eq!(job.catalog.coin_bags[0].diamonds, 1);
    }

    #[test]
    fn apply_save__success_marks_catalog_clean() {
        // given
        let mut controller = catalog_controller();
        controller.edit_catalog(CatalogSection::CoinBags, 0, CatalogField::Coins, "20");
        let job = controller.begin_save().unwrap();

        // when
        controller
            .apply_save(job.generation, job.revision, Ok(()))
            .unwrap();

        // then
        let snapshot = controller.build_snapshot();
        assert!(!snapshot.catalog_dirty);
        assert_eq!(snapshot.status, "Shop catalog saved");
    }

    #[tokio::test]
    async fn api_worker__hung_grant_does_not_hold_up_later_commands() {
        // given
        // accepted by the kernel backlog but never answered
        let silent = TcpListener::bind("127.0.0.1:0").unwrap();
        let api = HttpAdminApi::new(format!("http://{}/api", silent.local_addr().unwrap()))
            .unwrap()
            .with_token(AuthToken::new("tok"));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(api_worker(api, cmd_rx, event_tx));
        let targets: IdSet = [TelegramId::new("u1")].into_iter().collect();

        // when
        cmd_tx
            .send(ApiCommand::Grant(BatchRequest::new(&targets, "5").unwrap()))
            .unwrap();
        cmd_tx.send(ApiCommand::Shutdown).unwrap();
        let finished = tokio::time::timeout(Duration::from_secs(2), worker).await;

        // then
        assert!(matches!(finished, Ok(Ok(Ok(())))));
        assert!(event_rx.try_recv().is_err());
    }
}
