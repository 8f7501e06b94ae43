use std::rc::Rc;

use adw::prelude::*;
use adw::Application;
use gtk4 as gtk;
use log::{info, warn};
use murmur::api::ChatApi;
use murmur::app::AppState;
use murmur::utils::normalize_url;
use murmur::{ApiClient, Credential};

pub fn show_login_window(app: &Application, state: AppState) {
    let window = adw::ApplicationWindow::builder()
        .application(app)
        .title("Murmur Login")
        .default_width(420)
        .default_height(300)
        .resizable(false)
        .build();

    let toast_overlay = adw::ToastOverlay::new();

    let root = gtk::Box::new(gtk::Orientation::Vertical, 12);
    root.set_margin_top(24);
    root.set_margin_bottom(24);
    root.set_margin_start(24);
    root.set_margin_end(24);

    let title = gtk::Label::new(Some("Connect to Murmur"));
    title.add_css_class("title-2");
    title.set_halign(gtk::Align::Start);
    root.append(&title);

    let server_entry = gtk::Entry::new();
    server_entry.set_placeholder_text(Some("API URL (e.g. https://chat.example.com/api)"));
    server_entry.set_text(&state.base_url);
    server_entry.set_hexpand(true);

    let user_entry = gtk::Entry::new();
    user_entry.set_placeholder_text(Some("User id"));
    user_entry.set_text(state.user_id.as_deref().unwrap_or_default());

    let token_entry = gtk::PasswordEntry::new();
    token_entry.set_placeholder_text(Some("Access token"));
    token_entry.set_hexpand(true);

    let form = gtk::Box::new(gtk::Orientation::Vertical, 8);
    form.append(&server_entry);
    form.append(&user_entry);
    form.append(&token_entry);
    root.append(&form);

    let status = gtk::Label::new(None);
    status.add_css_class("dim-label");
    status.set_halign(gtk::Align::Start);
    root.append(&status);

    let login_btn = gtk::Button::with_label("Connect");
    login_btn.add_css_class("suggested-action");
    login_btn.set_halign(gtk::Align::End);
    root.append(&login_btn);

    toast_overlay.set_child(Some(&root));
    let container = gtk::Box::new(gtk::Orientation::Vertical, 0);
    let header = adw::HeaderBar::new();
    let header_title = gtk::Label::new(Some("Murmur"));
    header.set_title_widget(Some(&header_title));
    container.append(&header);
    container.append(&toast_overlay);
    window.set_content(Some(&container));

    let on_connect = {
        let app = app.clone();
        let window = window.clone();
        let overlay = toast_overlay.clone();
        let server_entry = server_entry.clone();
        let user_entry = user_entry.clone();
        let token_entry = token_entry.clone();
        move || {
            let url = normalize_url(&server_entry.text());
            let user_id = user_entry.text().trim().to_string();
            let token = token_entry.text().to_string();
            if server_entry.text().trim().is_empty() || user_id.is_empty() || token.is_empty() {
                overlay.add_toast(adw::Toast::new("Please enter the API URL, user id and token."));
                return;
            }

            let mut next = state.clone();
            next.base_url = url;
            next.user_id = Some(user_id);
            next.token = Some(token);

            let client = match ApiClient::with_timeout(
                &next.base_url,
                Credential::new(next.token.clone().unwrap_or_default()),
                next.request_timeout(),
            ) {
                Ok(client) => client,
                Err(err) => {
                    overlay.add_toast(adw::Toast::new(&format!("Invalid server URL: {err}")));
                    return;
                }
            };

            status.set_label("Connecting…");
            let status = status.clone();
            let app = app.clone();
            let window = window.clone();
            let overlay = overlay.clone();
            super::spawn_local(async move {
                // Listing conversations doubles as a token check.
                let checked = super::on_runtime(async move { client.conversations().await.map(|_| ()) }).await;
                match checked {
                    Some(Ok(())) => {
                        info!("signed in to {}", next.base_url);
                        if let Err(err) = next.save() {
                            warn!("could not save settings: {err}");
                            overlay.add_toast(adw::Toast::new(&format!("Failed to save settings: {err}")));
                        }
                        super::main_window::show_main_window(&app, next);
                        window.close();
                    }
                    Some(Err(err)) => {
                        warn!("server check failed: {err}");
                        status.set_label("Connection failed");
                        overlay.add_toast(adw::Toast::new("Could not reach the server. Check URL and token."));
                    }
                    None => status.set_label("Connection failed"),
                }
            });
        }
    };

    let on_connect: Rc<dyn Fn()> = Rc::new(on_connect);
    {
        let on_connect = on_connect.clone();
        login_btn.connect_clicked(move |_| (on_connect)());
    }
    {
        let on_connect = on_connect.clone();
        server_entry.connect_activate(move |_| (on_connect)());
    }
    {
        let on_connect = on_connect.clone();
        token_entry.connect_activate(move |_| (on_connect)());
    }

    window.present();
}
