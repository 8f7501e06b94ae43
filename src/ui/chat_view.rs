use std::path::PathBuf;

use gtk4::prelude::*;
use gtk4 as gtk;
use murmur::presentation::{Alignment, Bubble, MediaKind, StatusTick};

pub struct ChatView {
    root: gtk::Box,
    title: gtk::Label,
    subtitle: gtk::Label,
    reconnecting: gtk::Label,
    messages_box: gtk::Box,
    scroller: gtk::ScrolledWindow,
    entry: gtk::Entry,
    send_btn: gtk::Button,
    attach_btn: gtk::Button,
    attachment: gtk::Label,
}

impl ChatView {
    pub fn new() -> Self {
        let root = gtk::Box::new(gtk::Orientation::Vertical, 6);
        root.set_margin_top(8);
        root.set_margin_bottom(8);
        root.set_margin_start(8);
        root.set_margin_end(8);

        let title = gtk::Label::new(None);
        title.add_css_class("title-3");
        title.set_halign(gtk::Align::Start);
        let subtitle = gtk::Label::new(None);
        subtitle.add_css_class("dim-label");
        subtitle.set_halign(gtk::Align::Start);
        root.append(&title);
        root.append(&subtitle);

        let reconnecting = gtk::Label::new(Some("Connection lost, reconnecting…"));
        reconnecting.add_css_class("warning");
        reconnecting.set_visible(false);
        root.append(&reconnecting);

        let scroller = gtk::ScrolledWindow::builder()
            .vexpand(true)
            .hexpand(true)
            .build();
        let messages_box = gtk::Box::new(gtk::Orientation::Vertical, 6);
        scroller.set_child(Some(&messages_box));
        root.append(&scroller);

        let attachment = gtk::Label::new(None);
        attachment.add_css_class("dim-label");
        attachment.set_halign(gtk::Align::Start);
        attachment.set_visible(false);
        root.append(&attachment);

        let input_row = gtk::Box::new(gtk::Orientation::Horizontal, 6);
        let attach_btn = gtk::Button::from_icon_name("mail-attachment-symbolic");
        let entry = gtk::Entry::new();
        entry.set_hexpand(true);
        entry.set_placeholder_text(Some("Type a message…"));
        let send_btn = gtk::Button::with_label("Send");
        send_btn.add_css_class("suggested-action");
        input_row.append(&attach_btn);
        input_row.append(&entry);
        input_row.append(&send_btn);
        root.append(&input_row);

        let view = Self {
            root,
            title,
            subtitle,
            reconnecting,
            messages_box,
            scroller,
            entry,
            send_btn,
            attach_btn,
            attachment,
        };
        view.show_placeholder("Select a conversation");
        view
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    pub fn text(&self) -> String {
        self.entry.text().to_string()
    }

    pub fn set_text(&self, text: &str) {
        self.entry.set_text(text);
    }

    pub fn set_attachment_name(&self, name: Option<&str>) {
        match name {
            Some(name) => {
                self.attachment.set_label(&format!("📎 {name}"));
                self.attachment.set_visible(true);
            }
            None => self.attachment.set_visible(false),
        }
    }

    pub fn set_reconnecting(&self, reconnecting: bool) {
        self.reconnecting.set_visible(reconnecting);
    }

    pub fn set_input_enabled(&self, enabled: bool) {
        self.entry.set_sensitive(enabled);
        self.send_btn.set_sensitive(enabled);
        self.attach_btn.set_sensitive(enabled);
    }

    pub fn set_header(&self, title: &str, subtitle: Option<&str>) {
        self.title.set_label(title);
        self.subtitle.set_label(subtitle.unwrap_or_default());
        self.subtitle.set_visible(subtitle.is_some());
    }

    pub fn connect_send(&self, f: impl Fn() + 'static) {
        let f = std::rc::Rc::new(f);
        {
            let f = f.clone();
            self.send_btn.connect_clicked(move |_| f());
        }
        self.entry.connect_activate(move |_| f());
    }

    pub fn connect_changed(&self, f: impl Fn(String) + 'static) {
        self.entry.connect_changed(move |entry| f(entry.text().to_string()));
    }

    /// Calls `f` with the file the user picked.
    pub fn connect_attach(&self, f: impl Fn(PathBuf) + 'static) {
        let f = std::rc::Rc::new(f);
        let root = self.root.clone();
        self.attach_btn.connect_clicked(move |_| {
            let parent = root.root().and_downcast::<gtk::Window>();
            let dialog = gtk::FileChooserDialog::new(
                Some("Attach a file"),
                parent.as_ref(),
                gtk::FileChooserAction::Open,
                &[("Cancel", gtk::ResponseType::Cancel), ("Attach", gtk::ResponseType::Accept)],
            );
            dialog.set_modal(true);
            let f = f.clone();
            dialog.connect_response(move |dialog, response| {
                if response == gtk::ResponseType::Accept {
                    if let Some(path) = dialog.file().and_then(|file| file.path()) {
                        f(path);
                    }
                }
                dialog.close();
            });
            dialog.present();
        });
    }

    pub fn show_placeholder(&self, text: &str) {
        self.clear_messages();
        let label = gtk::Label::new(Some(text));
        label.add_css_class("dim-label");
        label.set_vexpand(true);
        self.messages_box.append(&label);
    }

    pub fn set_bubbles(&self, bubbles: &[Bubble]) {
        self.clear_messages();
        if bubbles.is_empty() {
            self.show_placeholder("No messages yet");
            return;
        }
        for bubble in bubbles {
            self.messages_box.append(&render_bubble(bubble));
        }
        let adj = self.scroller.vadjustment();
        adj.set_value(adj.upper());
    }

    fn clear_messages(&self) {
        while let Some(child) = self.messages_box.first_child() {
            self.messages_box.remove(&child);
        }
    }
}

fn render_bubble(bubble: &Bubble) -> gtk::Box {
    let frame = gtk::Box::new(gtk::Orientation::Vertical, 2);
    frame.add_css_class("card");
    frame.set_margin_top(2);
    frame.set_margin_bottom(2);
    match bubble.alignment {
        Alignment::End => frame.set_halign(gtk::Align::End),
        Alignment::Start => frame.set_halign(gtk::Align::Start),
    }

    let label = |text: &str, class: Option<&str>| {
        let lbl = gtk::Label::new(Some(text));
        lbl.set_wrap(true);
        lbl.set_xalign(0.0);
        lbl.set_margin_start(8);
        lbl.set_margin_end(8);
        if let Some(class) = class {
            lbl.add_css_class(class);
        }
        lbl
    };

    if let Some(name) = &bubble.sender_name {
        frame.append(&label(name, Some("heading")));
    }
    if let Some(call) = &bubble.call {
        frame.append(&label(call, None));
    }
    for (url, kind) in &bubble.media {
        let icon = match kind {
            MediaKind::Image => "🖼️",
            MediaKind::Video => "🎞️",
            MediaKind::Audio => "🔊",
        };
        frame.append(&label(&format!("{icon} {url}"), None));
    }
    if let Some(text) = &bubble.text {
        let body = label(text, None);
        body.set_selectable(true);
        frame.append(&body);
    }

    let footer = match bubble.status {
        Some(StatusTick::Single) => format!("{} ✓", bubble.time),
        Some(StatusTick::Double) | Some(StatusTick::Read) => format!("{} ✓✓", bubble.time),
        None => bubble.time.clone(),
    };
    let footer = label(&footer, Some("caption"));
    footer.set_xalign(1.0);
    if bubble.status == Some(StatusTick::Read) {
        footer.add_css_class("accent");
    } else {
        footer.add_css_class("dim-label");
    }
    frame.append(&footer);
    frame
}
