use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use super::context::EditorContext;
use crate::backend::SharedIssueBackend;
use crate::document::{Document, LinkAttrs, Mark, TextRun};
use crate::errors::{EditorError, SyncError};
use crate::github::{Issue, IssuePatch, IssueState, NewIssue};
use crate::sync::{SyncTrigger, Synchronizer, collect_issue_numbers, reconcile_in_place};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogMode {
    /// The selection has no issue link; submitting creates an issue.
    Create,
    /// The selection touches an issue link; submitting renames the link.
    Update { number: u64, state: Option<IssueState> },
}

/// The issue dialog as opened over a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueDialog {
    pub mode: DialogMode,
    pub title: String,
    pub from: usize,
    pub to: usize,
}

/// Document changes a host may want to react to, e.g. to save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    IssueLinked { number: u64 },
    TitleUpdated { number: u64 },
    StateChanged { number: u64, state: IssueState },
    StateRolledBack { number: u64, state: IssueState },
    Synced { changed: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Created(Issue),
    Updated { number: u64 },
}

/// A local state change awaiting the remote result.
struct PendingState {
    from: usize,
    to: usize,
    previous: LinkAttrs,
    applied: LinkAttrs,
}

#[derive(Default)]
struct EditorState {
    doc: Document,
    dirty: bool,
    dialog: Option<IssueDialog>,
    in_flight: bool,
    pending: Option<PendingState>,
    closed: bool,
}

impl EditorState {
    fn ensure_open(&self) -> Result<(), EditorError> {
        if self.closed {
            return Err(EditorError::SessionClosed);
        }
        Ok(())
    }

    fn begin_request(&mut self) -> Result<(), EditorError> {
        self.ensure_open()?;
        if self.in_flight {
            return Err(EditorError::Busy);
        }
        self.in_flight = true;
        Ok(())
    }
}

/// Undo a pending change if the link still carries what it applied.
fn roll_back(doc: &mut Document, pending: &PendingState) -> bool {
    let span = doc
        .link_spans()
        .into_iter()
        .find(|s| s.attrs == pending.applied && s.from < pending.to && pending.from < s.to);
    match span {
        Some(span) => doc.replace_link(&span, pending.previous.clone()),
        None => false,
    }
}

/// A headless editing session over one document.
///
/// All state sits behind one async mutex that is never held across a remote
/// call: actions snapshot what they need, release the lock, call the
/// backend, then re-lock and apply the result to the current document.
pub struct EditorSession {
    state: Mutex<EditorState>,
    backend: SharedIssueBackend,
    synchronizer: Synchronizer,
    context: EditorContext,
    events: broadcast::Sender<DocumentEvent>,
}

impl EditorSession {
    pub fn new(doc: Document, backend: SharedIssueBackend, context: EditorContext) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(EditorState {
                doc,
                ..EditorState::default()
            }),
            synchronizer: Synchronizer::new(backend.clone()),
            backend,
            context,
            events,
        }
    }

    pub fn from_markup(
        markup: &str,
        backend: SharedIssueBackend,
        context: EditorContext,
    ) -> Result<Self, EditorError> {
        Ok(Self::new(Document::from_markup(markup)?, backend, context))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: DocumentEvent) {
        let _ = self.events.send(event);
    }

    pub async fn document(&self) -> Document {
        self.state.lock().await.doc.clone()
    }

    pub async fn to_markup(&self) -> String {
        self.state.lock().await.doc.to_markup()
    }

    pub async fn is_dirty(&self) -> bool {
        self.state.lock().await.dirty
    }

    pub async fn is_busy(&self) -> bool {
        self.state.lock().await.in_flight
    }

    pub async fn dialog(&self) -> Option<IssueDialog> {
        self.state.lock().await.dialog.clone()
    }

    /// Apply a user edit.
    pub async fn edit<R>(&self, f: impl FnOnce(&mut Document) -> R) -> Result<R, EditorError> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        let out = f(&mut state.doc);
        state.doc.normalize();
        state.dirty = true;
        Ok(out)
    }

    // ── Issue dialog ──────────────────────────────────────────────────

    /// Open the issue dialog over `[from, to)`. A selection touching an
    /// issue link opens it in update mode with the link's title.
    pub async fn open_issue_dialog(&self, from: usize, to: usize) -> Result<IssueDialog, EditorError> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        state.doc.check_range(from, to)?;

        let existing = state
            .doc
            .issue_link_in_range(from, to)
            .and_then(|span| span.attrs.issue_number.map(|n| (n, span.attrs)));
        let dialog = match existing {
            Some((number, attrs)) => IssueDialog {
                mode: DialogMode::Update {
                    number,
                    state: attrs.issue_state,
                },
                title: attrs.issue_title.unwrap_or_default(),
                from,
                to,
            },
            None => IssueDialog {
                mode: DialogMode::Create,
                title: String::new(),
                from,
                to,
            },
        };
        state.dialog = Some(dialog.clone());
        Ok(dialog)
    }

    pub async fn set_dialog_title(&self, title: impl Into<String>) -> Result<(), EditorError> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        let dialog = state.dialog.as_mut().ok_or(EditorError::DialogClosed)?;
        dialog.title = title.into();
        Ok(())
    }

    pub async fn cancel_dialog(&self) {
        self.state.lock().await.dialog = None;
    }

    /// Submit the open dialog: create an issue from the selection, or rename
    /// the selected issue link.
    pub async fn submit_issue(&self) -> Result<SubmitOutcome, EditorError> {
        let dialog = {
            let state = self.state.lock().await;
            state.ensure_open()?;
            state.dialog.clone().ok_or(EditorError::DialogClosed)?
        };
        let title = dialog.title.trim().to_string();
        if title.is_empty() {
            return Err(EditorError::TitleRequired);
        }
        match dialog.mode {
            DialogMode::Create => self.create_issue(&dialog, title).await,
            DialogMode::Update { number, .. } => self.rename_issue_link(&dialog, number, title).await,
        }
    }

    async fn create_issue(&self, dialog: &IssueDialog, title: String) -> Result<SubmitOutcome, EditorError> {
        let new_issue = {
            let mut state = self.state.lock().await;
            state.ensure_open()?;
            if state.doc.has_open_issue_between(dialog.from, dialog.to) {
                return Err(EditorError::OpenIssueInSelection);
            }
            let selected = state.doc.text_between(dialog.from, dialog.to)?;
            state.begin_request()?;
            NewIssue {
                title,
                body: Some(self.context.issue_body(&selected)),
                labels: Vec::new(),
            }
        };

        let result = self.backend.create(&new_issue).await;

        let mut state = self.state.lock().await;
        state.in_flight = false;
        let issue = result?;
        if state.closed {
            debug!(number = issue.number, "session closed; created issue not linked");
            return Ok(SubmitOutcome::Created(issue));
        }
        if issue.html_url.is_empty() {
            return Err(EditorError::MissingIssueUrl);
        }

        let mut attrs = LinkAttrs::for_issue(&issue);
        attrs.issue_state = Some(IssueState::Open);
        if dialog.from == dialog.to {
            let run = TextRun::with_marks(issue.title.clone(), vec![Mark::Link(attrs)]);
            state.doc.insert_text(dialog.from, run)?;
        } else {
            state.doc.apply_link(dialog.from, dialog.to, attrs)?;
        }
        state.dirty = true;
        state.dialog = None;
        drop(state);

        info!(number = issue.number, "issue created and linked");
        self.notify(DocumentEvent::IssueLinked { number: issue.number });
        Ok(SubmitOutcome::Created(issue))
    }

    async fn rename_issue_link(
        &self,
        dialog: &IssueDialog,
        number: u64,
        title: String,
    ) -> Result<SubmitOutcome, EditorError> {
        {
            let mut state = self.state.lock().await;
            state.ensure_open()?;
            let span = state
                .doc
                .issue_link_in_range(dialog.from, dialog.to)
                .filter(|s| s.attrs.issue_number == Some(number))
                .ok_or(EditorError::NoIssueLink)?;
            let changed = state.doc.update_link(&span, |attrs| {
                attrs.issue_title = Some(title);
                attrs.ensure_issue_class();
            });
            if changed {
                state.dirty = true;
            }
            state.dialog = None;
        }

        self.notify(DocumentEvent::TitleUpdated { number });
        if let Err(e) = self.sync(SyncTrigger::AfterChange).await {
            debug!(number, error = %e, "sync after rename failed");
        }
        Ok(SubmitOutcome::Updated { number })
    }

    // ── Close / reopen ────────────────────────────────────────────────

    pub async fn close_issue(&self, from: usize, to: usize) -> Result<Issue, EditorError> {
        self.set_issue_state(from, to, IssueState::Closed).await
    }

    pub async fn reopen_issue(&self, from: usize, to: usize) -> Result<Issue, EditorError> {
        self.set_issue_state(from, to, IssueState::Open).await
    }

    /// Flip the selected issue link to `target` at once, then ask the
    /// backend. A remote failure restores the previous attributes.
    async fn set_issue_state(&self, from: usize, to: usize, target: IssueState) -> Result<Issue, EditorError> {
        let number = {
            let mut state = self.state.lock().await;
            state.ensure_open()?;
            let span = state
                .doc
                .issue_link_in_range(from, to)
                .ok_or(EditorError::NoIssueLink)?;
            let number = span.attrs.issue_number.ok_or(EditorError::NoIssueLink)?;
            state.begin_request()?;

            let mut applied = span.attrs.clone();
            applied.issue_state = Some(target);
            applied.ensure_issue_class();
            state.doc.replace_link(&span, applied.clone());
            state.dirty = true;
            if let Some(dialog) = state.dialog.as_mut()
                && let DialogMode::Update { number: n, state: s } = &mut dialog.mode
                && *n == number
            {
                *s = Some(target);
            }
            state.pending = Some(PendingState {
                from: span.from,
                to: span.to,
                previous: span.attrs,
                applied,
            });
            number
        };
        self.notify(DocumentEvent::StateChanged { number, state: target });

        let result = self.backend.update(number, &IssuePatch::state(target)).await;

        let mut state = self.state.lock().await;
        state.in_flight = false;
        let pending = state.pending.take();
        match result {
            Ok(issue) => {
                if state.closed {
                    return Ok(issue);
                }
                if state
                    .dialog
                    .as_ref()
                    .is_some_and(|d| matches!(d.mode, DialogMode::Update { number: n, .. } if n == number))
                {
                    state.dialog = None;
                }
                drop(state);

                info!(number, state = %target, "issue state updated");
                if let Err(e) = self.sync(SyncTrigger::AfterChange).await {
                    debug!(number, error = %e, "sync after state change failed");
                }
                Ok(issue)
            }
            Err(e) => {
                warn!(number, error = %e, "issue state change failed; rolling back");
                if !state.closed
                    && let Some(pending) = pending
                    && roll_back(&mut state.doc, &pending)
                {
                    let restored = pending.previous.issue_state.unwrap_or(IssueState::Open);
                    drop(state);
                    self.notify(DocumentEvent::StateRolledBack {
                        number,
                        state: restored,
                    });
                }
                Err(e.into())
            }
        }
    }

    // ── Synchronization ───────────────────────────────────────────────

    /// Fetch the state of every linked issue and fix stale links. The
    /// fetch runs unlocked; the result is applied to whatever the document
    /// holds by then.
    pub async fn sync(&self, trigger: SyncTrigger) -> Result<usize, SyncError> {
        let numbers = {
            let state = self.state.lock().await;
            if state.closed {
                return Ok(0);
            }
            collect_issue_numbers(&state.doc)
        };
        if numbers.is_empty() {
            debug!(%trigger, "no issue links to sync");
            return Ok(0);
        }

        let issues = self.synchronizer.fetch(&numbers).await?;

        let mut state = self.state.lock().await;
        if state.closed {
            debug!(%trigger, "session closed; discarding sync result");
            return Ok(0);
        }
        let changed = reconcile_in_place(&mut state.doc, &issues);
        if changed > 0 {
            state.dirty = true;
        }
        drop(state);

        info!(%trigger, linked = numbers.len(), changed, "issue links synced");
        if changed > 0 {
            self.notify(DocumentEvent::Synced { changed });
        }
        Ok(changed)
    }

    pub async fn on_content_ready(&self) -> Result<usize, SyncError> {
        self.sync(SyncTrigger::ContentReady).await
    }

    pub async fn on_focus(&self) -> Result<usize, SyncError> {
        self.sync(SyncTrigger::Focus).await
    }

    /// End the session. Results of requests still in flight are dropped.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.dialog = None;
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}
