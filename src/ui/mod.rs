pub mod chat_view;
pub mod login;
pub mod main_window;
pub mod sidebar;

use std::future::Future;

use adw::Application;
use log::warn;
use murmur::app::AppState;
use murmur::utils::RUNTIME;

pub fn build_ui(app: &Application) {
    let state = AppState::load();
    if state.is_complete() {
        main_window::show_main_window(app, state);
    } else {
        login::show_login_window(app, state);
    }
}

/// Runs `fut` on the main loop. Widgets and `RefCell` state stay on this
/// thread.
pub fn spawn_local<F>(fut: F)
where
    F: Future<Output = ()> + 'static,
{
    glib::MainContext::default().spawn_local(fut);
}

/// Runs network work on the shared tokio runtime and hands the result back
/// to whoever awaits it on the main loop.
pub async fn on_runtime<T, F>(fut: F) -> Option<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    match RUNTIME.spawn(fut).await {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("background task failed: {err}");
            None
        }
    }
}
