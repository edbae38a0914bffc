#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tao::dpi::{LogicalSize, PhysicalPosition};
use tao::event::{Event, WindowEvent};
use tao::event_loop::{ControlFlow, EventLoopBuilder};
use tao::window::{Window, WindowBuilder};
use wry::{DragDropEvent, WebViewBuilder};

use md_live::template;
use md_live::webview::{dropped_markdown, KEY_BINDINGS};
use md_live::{
    Args, Config, DocumentViewController, IpcCommand, MarkdownRenderer, NotifyWatchService,
    ViewerError, WatchEvent, WebViewDisplay,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Everything that reaches the UI thread from outside the event loop.
#[derive(Debug)]
enum UserEvent {
    FileChanged(WatchEvent),
    Command(IpcCommand),
    Dropped(PathBuf),
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = Config::from(Args::parse());

    let event_loop = EventLoopBuilder::<UserEvent>::with_user_event().build();
    let proxy = event_loop.create_proxy();

    let (width, height) = config.window_size;
    let window = WindowBuilder::new()
        .with_title(&config.title)
        .with_inner_size(LogicalSize::new(width, height))
        .build(&event_loop)
        .context("create window")?;
    center(&window);

    let ipc_proxy = proxy.clone();
    let drop_proxy = proxy.clone();
    let webview = WebViewBuilder::new()
        .with_html(template::page(""))
        .with_initialization_script(KEY_BINDINGS)
        .with_ipc_handler(move |request| {
            if let Some(cmd) = IpcCommand::parse(request.body()) {
                let _ = ipc_proxy.send_event(UserEvent::Command(cmd));
            }
        })
        .with_drag_drop_handler(move |event| {
            if let DragDropEvent::Drop { paths, .. } = event {
                match dropped_markdown(&paths) {
                    Some(path) => {
                        let _ = drop_proxy.send_event(UserEvent::Dropped(path.to_path_buf()));
                    }
                    None => log::warn!(
                        "Unsupported file type. Please drop a markdown file (.md, .markdown, .txt)"
                    ),
                }
                return true;
            }
            false
        })
        .build(&window)
        .context("create web view")?;

    let watcher = NotifyWatchService::new(config.debounce, move |event| {
        let _ = proxy.send_event(UserEvent::FileChanged(event));
    });

    let display = WebViewDisplay::new(window, webview).context("prepare page directory")?;
    let mut controller =
        DocumentViewController::new(MarkdownRenderer::default(), display, watcher);
    report(controller.open(config.file.as_deref()));

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;

        match event {
            Event::UserEvent(UserEvent::FileChanged(change)) => {
                report(controller.on_external_change(&change));
            }
            Event::UserEvent(UserEvent::Dropped(path)) => {
                report(controller.open(Some(path.as_path())));
            }
            Event::UserEvent(UserEvent::Command(IpcCommand::Open)) => {
                if let Some(path) = open_file_dialog() {
                    report(controller.open(Some(path.as_path())));
                }
            }
            Event::UserEvent(UserEvent::Command(IpcCommand::Reload)) => {
                report(controller.reload());
            }
            Event::UserEvent(UserEvent::Command(IpcCommand::Quit))
            | Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                ..
            } => {
                controller.dispose();
                *control_flow = ControlFlow::Exit;
            }
            _ => {}
        }
    });
}

/// The controller already showed the failure; only the log is left.
fn report(result: Result<(), ViewerError>) {
    match result {
        Ok(()) => {}
        Err(e @ ViewerError::Display(_)) => log::error!("{}", e),
        Err(e) => log::debug!("Recovered: {}", e),
    }
}

fn open_file_dialog() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .set_title("Open file")
        .add_filter("Markdown", &["md", "markdown"])
        .add_filter("Text", &["txt"])
        .add_filter("All Files", &["*"])
        .pick_file()
}

fn center(window: &Window) {
    let Some(monitor) = window.current_monitor() else {
        return;
    };
    let screen = monitor.size();
    let size = window.outer_size();
    let origin = monitor.position();
    window.set_outer_position(PhysicalPosition::new(
        origin.x + (screen.width.saturating_sub(size.width) / 2) as i32,
        origin.y + (screen.height.saturating_sub(size.height) / 2) as i32,
    ));
}
