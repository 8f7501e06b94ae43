use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use adw::prelude::*;
use adw::Application;
use chrono::Utc;
use log::{info, warn};
use murmur::api::models::{ConversationId, UserId};
use murmur::api::ChatApi;
use murmur::app::AppState;
use murmur::directory::DirectoryChange;
use murmur::error::ChatError;
use murmur::presentation;
use murmur::session::{fetch_history, submit_message, OpenOutcome, SessionChange, SessionState};
use murmur::storage::Cache;
use murmur::transport::Subscription;
use murmur::utils::{spawn_async, RUNTIME};
use murmur::{
    ApiClient, Attachment, Composer, ConversationDirectory, ConversationSession, Draft, Transport,
    WebSocketDialer,
};

use super::chat_view::ChatView;
use super::sidebar::Sidebar;
use super::{on_runtime, spawn_local};

/// Everything the main window drives. Lives on the GTK thread.
struct Shell {
    api: Arc<ApiClient>,
    transport: Transport,
    me: UserId,
    directory: RefCell<ConversationDirectory>,
    session: RefCell<ConversationSession>,
    composer: RefCell<Composer>,
    cache: Option<RefCell<Cache>>,
    sidebar: Sidebar,
    chat: ChatView,
    overlay: adw::ToastOverlay,
}

pub fn show_main_window(app: &Application, state: AppState) {
    let (Some(credential), Some(me)) = (state.credential(), state.current_user()) else {
        super::login::show_login_window(app, state);
        return;
    };
    let api = match ApiClient::with_timeout(&state.base_url, credential.clone(), state.request_timeout()) {
        Ok(api) => Arc::new(api),
        Err(err) => {
            warn!("bad API URL: {err}");
            super::login::show_login_window(app, state);
            return;
        }
    };
    let dialer = match state.socket_url().map(|url| WebSocketDialer::new(&url)) {
        Some(Ok(dialer)) => dialer,
        _ => {
            warn!("no usable socket URL for {}", state.base_url);
            super::login::show_login_window(app, state);
            return;
        }
    };

    let window = adw::ApplicationWindow::builder()
        .application(app)
        .title("Murmur")
        .default_width(960)
        .default_height(640)
        .build();

    let overlay = adw::ToastOverlay::new();
    let split = adw::Flap::builder()
        .reveal_flap(true)
        .locked(true)
        .modal(false)
        .build();

    let sidebar = Sidebar::new();
    split.set_flap(Some(&sidebar.widget()));
    let chat = ChatView::new();
    split.set_content(Some(&chat.widget()));
    overlay.set_child(Some(&split));

    let container = gtk4::Box::new(gtk4::Orientation::Vertical, 0);
    let header = adw::HeaderBar::new();
    let title = gtk4::Label::new(Some("Murmur"));
    header.set_title_widget(Some(&title));
    let delete_btn = gtk4::Button::from_icon_name("user-trash-symbolic");
    delete_btn.set_tooltip_text(Some("Delete conversation"));
    header.pack_end(&delete_btn);
    let refresh_btn = gtk4::Button::from_icon_name("view-refresh-symbolic");
    refresh_btn.set_tooltip_text(Some("Reload conversations"));
    header.pack_start(&refresh_btn);
    container.append(&header);
    container.append(&overlay);
    window.set_content(Some(&container));

    let transport = Transport::new(dialer, state.transport_config(), RUNTIME.handle().clone());
    transport.connect(credential);

    let cache = match Cache::open_default() {
        Ok(cache) => Some(RefCell::new(cache)),
        Err(err) => {
            warn!("conversation cache unavailable: {err}");
            None
        }
    };

    let shell = Rc::new(Shell {
        api,
        directory: RefCell::new(ConversationDirectory::new(transport.clone(), me.clone())),
        session: RefCell::new(ConversationSession::new(transport.clone(), me.clone())),
        composer: RefCell::new(Composer::new()),
        transport,
        me,
        cache,
        sidebar,
        chat,
        overlay,
    });

    if let Some(cache) = &shell.cache {
        match cache.borrow().conversations(Some(200)) {
            Ok(cached) if !cached.is_empty() => {
                shell.directory.borrow_mut().restore_cached(cached);
            }
            Ok(_) => {}
            Err(err) => warn!("reading conversation cache failed: {err}"),
        }
    }
    shell.render_sidebar();
    shell.render_chat();

    pump_directory(Rc::downgrade(&shell), shell.directory.borrow().subscribe());
    pump_session(Rc::downgrade(&shell), shell.session.borrow().subscribe());
    shell.load_directory();

    {
        let weak = Rc::downgrade(&shell);
        shell.sidebar.connect_selected(move |id| {
            if let Some(shell) = weak.upgrade() {
                shell.open_conversation(id);
            }
        });
    }
    {
        let weak = Rc::downgrade(&shell);
        shell.sidebar.connect_search_changed(move || {
            if let Some(shell) = weak.upgrade() {
                shell.render_sidebar();
            }
        });
    }
    {
        let weak = Rc::downgrade(&shell);
        shell.chat.connect_send(move || {
            if let Some(shell) = weak.upgrade() {
                shell.send();
            }
        });
    }
    {
        let weak = Rc::downgrade(&shell);
        shell.chat.connect_changed(move |text| {
            if let Some(shell) = weak.upgrade() {
                shell.composer.borrow_mut().set_text(text);
            }
        });
    }
    {
        let weak = Rc::downgrade(&shell);
        shell.chat.connect_attach(move |path| {
            let Some(shell) = weak.upgrade() else { return };
            match Attachment::from_path(&path) {
                Ok(attachment) => {
                    shell.chat.set_attachment_name(Some(&attachment.file_name));
                    shell.composer.borrow_mut().attach(attachment);
                }
                Err(err) => shell.toast(&format!("Could not read {}: {err}", path.display())),
            }
        });
    }
    {
        let weak = Rc::downgrade(&shell);
        refresh_btn.connect_clicked(move |_| {
            if let Some(shell) = weak.upgrade() {
                shell.load_directory();
            }
        });
    }
    {
        let weak = Rc::downgrade(&shell);
        delete_btn.connect_clicked(move |_| {
            if let Some(shell) = weak.upgrade() {
                shell.delete_open_conversation();
            }
        });
    }
    {
        let shell = Rc::clone(&shell);
        window.connect_close_request(move |_| {
            shell.session.borrow_mut().close();
            shell.transport.disconnect();
            info!("main window closed");
            glib::Propagation::Proceed
        });
    }

    window.present();
}

fn pump_directory(shell: Weak<Shell>, mut events: Subscription) {
    spawn_local(async move {
        while let Some(event) = events.recv().await {
            let Some(shell) = shell.upgrade() else { break };
            let change = shell.directory.borrow_mut().handle_event(&event);
            if change != DirectoryChange::Unchanged {
                shell.render_sidebar();
            }
        }
    });
}

fn pump_session(shell: Weak<Shell>, mut events: Subscription) {
    spawn_local(async move {
        while let Some(event) = events.recv().await {
            let Some(shell) = shell.upgrade() else { break };
            let change = shell.session.borrow_mut().handle_event(&event);
            match change {
                SessionChange::Unchanged | SessionChange::Buffered => {}
                SessionChange::MessageInserted(_) => {
                    shell.render_chat();
                    shell.mark_read();
                }
                _ => shell.render_chat(),
            }
        }
    });
}

impl Shell {
    fn toast(&self, text: &str) {
        self.overlay.add_toast(adw::Toast::new(text));
    }

    fn render_sidebar(&self) {
        let now = Utc::now();
        let directory = self.directory.borrow();
        let rows = directory
            .filter(&self.sidebar.search_text())
            .into_iter()
            .map(|c| (c.id.clone(), presentation::conversation_row(c, &self.me, now)))
            .collect();
        self.sidebar.set_rows(rows, directory.foreground());
    }

    fn render_chat(&self) {
        let session = self.session.borrow();
        self.chat.set_reconnecting(session.is_reconnecting());
        match session.state() {
            SessionState::Idle => {
                self.chat.set_header("Murmur", None);
                self.chat.set_input_enabled(false);
                self.chat.show_placeholder("Select a conversation");
            }
            SessionState::LoadingHistory { .. } => {
                self.chat.set_input_enabled(false);
                self.chat.show_placeholder("Loading…");
            }
            SessionState::Failed { error, .. } => {
                self.chat.set_input_enabled(false);
                self.chat.show_placeholder(&error.to_string());
            }
            SessionState::Active { .. } => {
                let now = Utc::now();
                let conversation = session.conversation();
                if let Some(conversation) = conversation {
                    let title = presentation::conversation_title(conversation, &self.me);
                    let subtitle = presentation::presence_label(conversation, &self.me, now);
                    self.chat.set_header(&title, subtitle.as_deref());
                }
                let bubbles: Vec<_> = session
                    .messages()
                    .iter()
                    .map(|m| presentation::bubble(m, &self.me, conversation, now))
                    .collect();
                self.chat.set_bubbles(&bubbles);
                self.chat.set_input_enabled(true);
            }
        }
    }

    fn load_directory(self: &Rc<Self>) {
        let ticket = self.directory.borrow_mut().begin_load();
        let api = Arc::clone(&self.api);
        let shell = Rc::clone(self);
        spawn_local(async move {
            let Some(result) = on_runtime(async move { api.conversations().await }).await else {
                return;
            };
            let outcome = shell.directory.borrow_mut().finish_load(ticket, result);
            match outcome {
                Ok(_) => {
                    if let Some(cache) = &shell.cache {
                        let directory = shell.directory.borrow();
                        if let Err(err) = cache.borrow_mut().store_conversations(directory.conversations()) {
                            warn!("caching conversations failed: {err}");
                        }
                    }
                }
                Err(err) => shell.toast(&format!("Failed to load conversations: {err}")),
            }
            shell.render_sidebar();
        });
    }

    fn open_conversation(self: &Rc<Self>, id: ConversationId) {
        if self.session.borrow().active_conversation_id() == Some(&id) {
            return;
        }
        let ticket = self.session.borrow_mut().begin_open(id.clone());
        self.directory.borrow_mut().set_foreground(Some(id));
        self.render_sidebar();
        self.render_chat();

        let api = Arc::clone(&self.api);
        let shell = Rc::clone(self);
        spawn_local(async move {
            let fetch_ticket = ticket.clone();
            let fetched = on_runtime(async move { fetch_history(&*api, &fetch_ticket).await }).await;
            let Some(result) = fetched else { return };
            let outcome = shell.session.borrow_mut().finish_open(ticket, result);
            match outcome {
                Ok(OpenOutcome::Opened) => shell.mark_read(),
                Ok(OpenOutcome::Superseded) => return,
                Err(ChatError::ConversationNotFound(id)) => {
                    shell.toast("This conversation no longer exists");
                    shell.directory.borrow_mut().forget(&id);
                    shell.render_sidebar();
                }
                Err(err) => shell.toast(&err.to_string()),
            }
            shell.render_chat();
        });
    }

    fn mark_read(&self) {
        let Some(id) = self.session.borrow().active_conversation_id().cloned() else {
            return;
        };
        let api = Arc::clone(&self.api);
        spawn_async(async move {
            if let Err(err) = api.mark_read(&id).await {
                warn!("mark-read of {id} failed: {err}");
            }
        });
    }

    fn send(self: &Rc<Self>) {
        let Some(draft) = self.composer.borrow_mut().take() else {
            return;
        };
        let outgoing = match self.session.borrow().prepare_send(&draft) {
            Ok(outgoing) => outgoing,
            Err(err) => {
                self.composer.borrow_mut().restore(draft);
                self.toast(&err.to_string());
                return;
            }
        };
        self.chat.set_text("");
        self.chat.set_attachment_name(None);

        let api = Arc::clone(&self.api);
        let shell = Rc::clone(self);
        spawn_local(async move {
            let sent = on_runtime(async move { submit_message(&*api, &outgoing).await }).await;
            match sent {
                Some(Ok(message)) => {
                    shell.session.borrow_mut().apply_sent(message);
                    shell.render_chat();
                }
                Some(Err(err)) => shell.restore_failed(draft, &err.to_string()),
                None => shell.restore_failed(draft, "Message not sent"),
            }
        });
    }

    /// Puts a failed draft back into the input. If the user already started
    /// a new message, the failed one is kept as unsent behind a toast button.
    fn restore_failed(self: &Rc<Self>, draft: Draft, reason: &str) {
        let restored = self.composer.borrow_mut().restore(draft);
        self.toast(reason);
        if restored {
            self.show_draft();
        } else {
            self.offer_unsent();
        }
    }

    fn offer_unsent(self: &Rc<Self>) {
        if self.composer.borrow().unsent().is_none() {
            return;
        }
        let toast = adw::Toast::new("An unsent message was kept");
        toast.set_button_label(Some("Restore"));
        toast.set_timeout(0);
        let weak = Rc::downgrade(self);
        toast.connect_button_clicked(move |_| {
            let Some(shell) = weak.upgrade() else { return };
            let recovered = shell.composer.borrow_mut().recover_unsent();
            if recovered {
                shell.show_draft();
                // The draft that was in the input is now the unsent one.
                shell.offer_unsent();
            }
        });
        self.overlay.add_toast(toast);
    }

    /// Mirrors the composer's draft into the input widgets.
    fn show_draft(&self) {
        let (text, name) = {
            let composer = self.composer.borrow();
            let draft = composer.draft();
            (draft.text.clone(), draft.attachment.as_ref().map(|a| a.file_name.clone()))
        };
        // The entry's change handler borrows the composer, so no borrow is
        // held here.
        self.chat.set_text(&text);
        self.chat.set_attachment_name(name.as_deref());
    }

    fn delete_open_conversation(self: &Rc<Self>) {
        let Some(id) = self.session.borrow().conversation_id().cloned() else {
            self.toast("Open a conversation to delete it");
            return;
        };
        let api = Arc::clone(&self.api);
        let shell = Rc::clone(self);
        spawn_local(async move {
            let target = id.clone();
            let deleted = on_runtime(async move { api.delete_conversation(&target).await }).await;
            match deleted {
                Some(Ok(())) => {
                    shell.directory.borrow_mut().forget(&id);
                    if shell.session.borrow().conversation_id() == Some(&id) {
                        shell.session.borrow_mut().close();
                    }
                    if let Some(cache) = &shell.cache {
                        if let Err(err) = cache.borrow().remove_conversation(&id) {
                            warn!("removing {id} from cache failed: {err}");
                        }
                    }
                    shell.render_sidebar();
                    shell.render_chat();
                }
                Some(Err(err)) => shell.toast(&format!("Failed to delete conversation: {err}")),
                None => {}
            }
        });
    }
}
