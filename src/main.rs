mod ui;

use adw::prelude::*;
use adw::Application;

fn main() -> glib::ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app = Application::builder()
        .application_id("org.murmur.Murmur")
        .build();
    app.connect_activate(ui::build_ui);
    app.run()
}
