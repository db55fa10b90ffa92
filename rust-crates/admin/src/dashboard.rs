//! The dashboard's state machine: snapshot, selection and refresh bookkeeping for
//! one mounted view.
//!
//! No network work happens here. The caller fetches with the [`RefreshTicket`]s
//! this hands out and reports back through [`DashboardView::complete_refresh`];
//! grants go out as the [`BatchRequest`] from [`DashboardView::prepare_grant`] and
//! come back through [`DashboardView::finish_grant`].

use crate::{
    api::AdminApi,
    dispatch::{
        self,
        BatchReceipt,
        BatchRequest,
    },
    error::ConsoleError,
    model::{
        PlayerRecord,
        RecordSnapshot,
        RowHandle,
    },
    refresh::{
        RefreshCoordinator,
        RefreshDisposition,
        RefreshTicket,
    },
    selection::{
        HandleSet,
        SelectionSet,
    },
};

#[derive(Debug, Default)]
pub struct DashboardView {
    snapshot: Option<RecordSnapshot>,
    selection: SelectionSet,
    refresh: RefreshCoordinator,
}

/// A grant went through. `refresh` is the reload it triggered, absent when the
/// view was unmounted while the grant was in flight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrantOutcome {
    pub receipt: BatchReceipt,
    pub refresh: Option<RefreshTicket>,
}

impl DashboardView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh view and returns the ticket for its initial load.
    pub fn mount(&mut self) -> RefreshTicket {
        self.refresh.mount();
        self.selection.clear();
        self.snapshot = None;
        tracing::info!("dashboard mounted");
        self.refresh.issue()
    }

    pub fn unmount(&mut self) {
        self.refresh.unmount();
        self.selection.clear();
        tracing::info!("dashboard unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.refresh.is_mounted()
    }

    pub fn is_loading(&self) -> bool {
        self.refresh.is_pending()
    }

    pub fn snapshot(&self) -> Option<&RecordSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    /// `None` while unmounted; there is nothing to reload into.
    pub fn request_refresh(&mut self) -> Option<RefreshTicket> {
        if !self.refresh.is_mounted() {
            return None;
        }
        let ticket = self.refresh.issue();
        tracing::debug!(sequence = ticket.sequence(), "refresh requested");
        Some(ticket)
    }

    /// Hands a finished fetch back to the view. Only the newest ticket of the
    /// current mount is applied; failures are returned so they can be shown.
    pub fn complete_refresh(
        &mut self,
        ticket: RefreshTicket,
        result: Result<Vec<PlayerRecord>, ConsoleError>,
    ) -> Result<RefreshDisposition, ConsoleError> {
        let disposition = self.refresh.settle(ticket);
        if disposition != RefreshDisposition::Apply {
            tracing::debug!(
                sequence = ticket.sequence(),
                ?disposition,
                "discarding refresh response"
            );
            return Ok(disposition);
        }
        let records = result?;
        let snapshot = RecordSnapshot::new(records);
        self.selection.prune(&snapshot);
        tracing::info!(
            sequence = ticket.sequence(),
            records = snapshot.len(),
            "snapshot applied"
        );
        self.snapshot = Some(snapshot);
        Ok(disposition)
    }

    /// Replaces the grid selection. Ignored until a snapshot exists.
    pub fn select_rows(&mut self, handles: HandleSet) {
        if let Some(snapshot) = &self.snapshot {
            self.selection.apply(handles, snapshot);
        }
    }

    pub fn toggle(&mut self, handle: &RowHandle) {
        if let Some(snapshot) = &self.snapshot {
            self.selection.toggle(handle, snapshot);
        }
    }

    pub fn toggle_all<'a, I>(&mut self, handles: I)
    where
        I: IntoIterator<Item = &'a RowHandle>,
    {
        if let Some(snapshot) = &self.snapshot {
            self.selection.toggle_all(handles, snapshot);
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Freezes the current selection into a request. Nothing is sent and nothing
    /// changes; an empty selection or a bad amount is reported here.
    pub fn prepare_grant(&self, amount_input: &str) -> Result<BatchRequest, ConsoleError> {
        BatchRequest::new(self.selection.ids(), amount_input)
    }

    /// Applies the result of a sent grant. On success the selection is cleared and
    /// a single reload is issued; on failure nothing changes.
    pub fn finish_grant(
        &mut self,
        result: Result<BatchReceipt, ConsoleError>,
    ) -> Result<GrantOutcome, ConsoleError> {
        let receipt = result?;
        self.selection.clear();
        let refresh = self.request_refresh();
        tracing::info!(
            players = receipt.players,
            amount = receipt.amount.get(),
            sequence = refresh.map(|ticket| ticket.sequence()),
            "diamonds granted"
        );
        Ok(GrantOutcome { receipt, refresh })
    }

    /// Prepares, sends and finishes one grant in a single step.
    pub async fn grant_diamonds<A: AdminApi>(
        &mut self,
        api: &A,
        amount_input: &str,
    ) -> Result<GrantOutcome, ConsoleError> {
        let request = self.prepare_grant(amount_input)?;
        let result = dispatch::send(api, request).await;
        self.finish_grant(result)
    }

    /// Fetches with `api` and applies the result under `ticket`.
    pub async fn refresh_with<A: AdminApi>(
        &mut self,
        api: &A,
        ticket: RefreshTicket,
    ) -> Result<RefreshDisposition, ConsoleError> {
        let result = api.list_users().await;
        self.complete_refresh(ticket, result)
    }
}
