use std::cell::RefCell;
use std::rc::Rc;

use gtk4::prelude::*;
use gtk4 as gtk;
use murmur::api::models::ConversationId;
use murmur::presentation::{Avatar, ConversationRow};

pub struct Sidebar {
    root: gtk::Box,
    search: gtk::SearchEntry,
    list: gtk::ListBox,
    ids: Rc<RefCell<Vec<ConversationId>>>,
}

impl Sidebar {
    pub fn new() -> Self {
        let root = gtk::Box::new(gtk::Orientation::Vertical, 6);
        root.set_margin_top(8);
        root.set_margin_bottom(8);
        root.set_margin_start(8);
        root.set_margin_end(8);
        root.set_width_request(280);

        let title = gtk::Label::new(Some("Conversations"));
        title.add_css_class("heading");
        title.set_halign(gtk::Align::Start);
        root.append(&title);

        let search = gtk::SearchEntry::new();
        search.set_placeholder_text(Some("Search"));
        root.append(&search);

        let list = gtk::ListBox::new();
        list.add_css_class("navigation-sidebar");
        let scroller = gtk::ScrolledWindow::builder().vexpand(true).child(&list).build();
        root.append(&scroller);

        Self { root, search, list, ids: Rc::new(RefCell::new(Vec::new())) }
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    pub fn search_text(&self) -> String {
        self.search.text().to_string()
    }

    pub fn connect_search_changed(&self, f: impl Fn() + 'static) {
        self.search.connect_search_changed(move |_| f());
    }

    pub fn connect_selected(&self, f: impl Fn(ConversationId) + 'static) {
        let ids = Rc::clone(&self.ids);
        self.list.connect_row_activated(move |_, row| {
            let id = usize::try_from(row.index()).ok().and_then(|i| ids.borrow().get(i).cloned());
            if let Some(id) = id {
                f(id);
            }
        });
    }

    pub fn set_rows(&self, rows: Vec<(ConversationId, ConversationRow)>, selected: Option<&ConversationId>) {
        while let Some(child) = self.list.first_child() {
            self.list.remove(&child);
        }
        let mut ids = self.ids.borrow_mut();
        ids.clear();
        for (id, row) in rows {
            let widget = render_row(&row);
            self.list.append(&widget);
            if selected == Some(&id) {
                self.list.select_row(Some(&widget));
            }
            ids.push(id);
        }
    }
}

fn render_row(row: &ConversationRow) -> gtk::ListBoxRow {
    let line = gtk::Box::new(gtk::Orientation::Horizontal, 8);
    line.set_margin_top(6);
    line.set_margin_bottom(6);
    line.set_margin_start(6);
    line.set_margin_end(6);

    // TODO: fetch profile photos and set them as the avatar's custom image.
    let initials = match &row.avatar {
        Avatar::Initials(initials) => initials.clone(),
        Avatar::Image(_) => row.title.clone(),
    };
    let avatar = adw::Avatar::new(40, Some(&initials), true);
    line.append(&avatar);

    let text = gtk::Box::new(gtk::Orientation::Vertical, 2);
    text.set_hexpand(true);
    let top = gtk::Box::new(gtk::Orientation::Horizontal, 6);
    let title = gtk::Label::new(Some(&row.title));
    title.add_css_class("heading");
    title.set_halign(gtk::Align::Start);
    title.set_hexpand(true);
    title.set_ellipsize(gtk::pango::EllipsizeMode::End);
    top.append(&title);
    if row.online {
        let dot = gtk::Label::new(Some("●"));
        dot.add_css_class("success");
        top.append(&dot);
    }
    if let Some(time) = &row.time {
        let when = gtk::Label::new(Some(time));
        when.add_css_class("dim-label");
        when.add_css_class("caption");
        top.append(&when);
    }
    text.append(&top);

    let preview = match row.preview.icon {
        Some(icon) => format!("{icon} {}", row.preview.text),
        None => row.preview.text.clone(),
    };
    let bottom = gtk::Label::new(Some(&preview));
    bottom.add_css_class("dim-label");
    bottom.set_halign(gtk::Align::Start);
    bottom.set_ellipsize(gtk::pango::EllipsizeMode::End);
    text.append(&bottom);
    line.append(&text);

    if row.unread > 0 {
        let badge = gtk::Label::new(Some(&row.unread.to_string()));
        badge.add_css_class("accent");
        badge.add_css_class("heading");
        badge.set_valign(gtk::Align::Center);
        line.append(&badge);
    }

    let list_row = gtk::ListBoxRow::new();
    list_row.set_child(Some(&line));
    list_row
}
