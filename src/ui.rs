use iocraft::prelude::*;
use tokio::sync::watch;

use wvault::{
    format::format_file_size,
    model::{Album, AlbumInfo, Bucket, Restrictions, UploadedFile},
    state::{BatchUploadState, FileUploadProgress, FileUploadStatus},
};

#[derive(Default, Props)]
pub struct SpinnerProps {
    pub color: Option<Color>,
}

#[component]
pub fn Spinner(props: &SpinnerProps, mut hooks: Hooks) -> impl Into<AnyElement<'static>> {
    let mut frame = hooks.use_state(|| 0usize);

    hooks.use_future(async move {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_millis(120)).await;
            frame.set((frame.get() + 1) % SPINNER_FRAMES.len());
        }
    });

    let color = props.color.unwrap_or(Color::Cyan);

    element! {
        Text(content: SPINNER_FRAMES[frame.get()], color: color)
    }
}

const SPINNER_FRAMES: [&str; 8] = ["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];

#[derive(Default, Props)]
struct StatusIconProps {
    status: Option<FileUploadStatus>,
}

#[component]
fn StatusIcon(props: &StatusIconProps) -> impl Into<AnyElement<'static>> {
    match props.status {
        Some(FileUploadStatus::Pending) => element! {
            Text(color: Color::Reset, content: "◇")
        }
        .into_any(),
        Some(FileUploadStatus::Uploading) => element! {
            Spinner()
        }
        .into_any(),
        Some(FileUploadStatus::Success(_)) => element! {
            Text(color: Color::Green, content: "◆")
        }
        .into_any(),
        Some(FileUploadStatus::Error(_)) => element! {
            Text(color: Color::Red, content: "▲")
        }
        .into_any(),
        None => element! {
            Text(color: Color::Yellow, content: "?")
        }
        .into_any(),
    }
}

#[derive(Default, Props)]
struct FileRowProps {
    progress: Option<FileUploadProgress>,
}

#[component]
fn FileRow(props: &FileRowProps) -> impl Into<AnyElement<'static>> {
    let Some(progress) = props.progress.as_ref() else {
        return element!(View).into_any();
    };

    let detail = match &progress.status {
        FileUploadStatus::Success(file) => format!("  {}", file.url),
        FileUploadStatus::Error(message) => format!("  {}", message),
        _ => String::new(),
    };
    let detail_color = match progress.status {
        FileUploadStatus::Error(_) => Color::Red,
        _ => Color::DarkGrey,
    };

    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(content: "│ ")
            StatusIcon(status: Some(progress.status.clone()))
            Text(content: format!(" {}", progress.file_name))
            Text(content: detail, color: detail_color)
        }
    }
    .into_any()
}

#[derive(Default, Props)]
pub struct BatchProgressProps {
    pub title: String,
    pub state: Option<watch::Receiver<BatchUploadState>>,
}

/// Follows a batch until it reaches `Success` or `Error`, then exits the render loop.
#[component]
pub fn BatchProgress(
    props: &BatchProgressProps,
    mut hooks: Hooks,
) -> impl Into<AnyElement<'static>> {
    let mut system = hooks.use_context_mut::<SystemContext>();
    let mut current = hooks.use_state(BatchUploadState::default);
    let mut should_exit = hooks.use_state(|| false);
    let receiver = props.state.clone();

    hooks.use_future(async move {
        let Some(mut receiver) = receiver else {
            should_exit.set(true);
            return;
        };

        loop {
            let snapshot = receiver.borrow_and_update().clone();
            let finished = snapshot.is_terminal();
            current.set(snapshot);

            if finished || receiver.changed().await.is_err() {
                should_exit.set(true);
                break;
            }
        }
    });

    if should_exit.get() {
        system.exit();
    }

    let state = current.read().clone();
    let title = match state.completed_count() {
        Some((done, total)) if total > 1 => format!("{} [{}/{}]", props.title, done, total),
        _ => props.title.clone(),
    };

    let body = match state {
        BatchUploadState::Idle => element! {
            View(flex_direction: FlexDirection::Row) {
                Text(content: "│ ")
                Spinner()
                Text(content: " Preparing")
            }
        }
        .into_any(),
        BatchUploadState::UploadingSingle(percent) => element! {
            View(flex_direction: FlexDirection::Row) {
                Text(content: "│ ")
                Spinner()
                Text(content: format!(" Uploading {}%", percent))
            }
        }
        .into_any(),
        BatchUploadState::UploadingMultiple(files) => element! {
            View(flex_direction: FlexDirection::Column) {
                #(files.into_iter().map(|progress| element! {
                    FileRow(progress: Some(progress))
                }))
            }
        }
        .into_any(),
        BatchUploadState::Processing => element! {
            View(flex_direction: FlexDirection::Row) {
                Text(content: "│ ")
                Spinner()
                Text(content: " Processing")
            }
        }
        .into_any(),
        BatchUploadState::Success { all_files, .. } => element! {
            Text(content: format!("│ {} file(s) uploaded", all_files.len()), color: Color::Green)
        }
        .into_any(),
        BatchUploadState::Error { .. } => element! {
            Text(content: "│ Upload failed", color: Color::Red)
        }
        .into_any(),
    };

    element! {
        View(flex_direction: FlexDirection::Column) {
            View(flex_direction: FlexDirection::Row) {
                Text(content: "┌ ")
                View(background_color: Color::Blue) {
                    Text(content: title, color: Color::White)
                }
            }
            #(Some(body))
        }
    }
}

#[derive(Default, Props)]
pub struct UploadSummaryProps {
    pub files: Vec<UploadedFile>,
    pub errors: Vec<String>,
}

#[component]
pub fn UploadSummary(props: &UploadSummaryProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            #(props.files.iter().map(|file| element! {
                View(flex_direction: FlexDirection::Column) {
                    Text(content: "│")
                    View(flex_direction: FlexDirection::Row) {
                        Text(content: "◆ ", color: Color::Green)
                        Text(content: file.url.clone(), weight: Weight::Bold)
                    }
                    Text(content: format!("│ token: {}", file.token))
                    Text(content: format!("│ expires in: {}", file.retention_period))
                    #(flag_line(file).map(|flags| element! {
                        Text(content: format!("│ {}", flags))
                    }))
                }
            }))
            #(props.errors.iter().map(|error| element! {
                View(flex_direction: FlexDirection::Row) {
                    Text(content: "▲ ", color: Color::Red)
                    Text(content: error.clone())
                }
            }))
        }
    }
}

fn flag_line(file: &UploadedFile) -> Option<String> {
    let mut flags = Vec::new();
    if file.options.protected {
        flags.push("password protected");
    }
    if file.options.hide_filename {
        flags.push("filename hidden");
    }
    if file.options.one_time_download {
        flags.push("one-time download");
    }
    if flags.is_empty() {
        None
    } else {
        Some(flags.join(", "))
    }
}

#[derive(Default, Props)]
pub struct FileDetailsProps {
    pub file: Option<UploadedFile>,
}

#[component]
pub fn FileDetails(props: &FileDetailsProps) -> impl Into<AnyElement<'static>> {
    let Some(file) = props.file.as_ref() else {
        return element!(View).into_any();
    };

    element! {
        View(flex_direction: FlexDirection::Column) {
            Text(content: file.url.clone(), weight: Weight::Bold)
            Text(content: format!("token:      {}", file.token))
            Text(content: format!("expires in: {}", file.retention_period))
            #(file.id.map(|id| element! {
                Text(content: format!("id:         {}", id))
            }))
            #(file.views.map(|views| element! {
                Text(content: format!("views:      {}", views))
            }))
            #(file.bucket.as_ref().map(|bucket| element! {
                Text(content: format!("bucket:     {}", bucket))
            }))
            #(file.album.as_ref().map(|album| element! {
                Text(content: format!("album:      {} ({})", album.name, album.token))
            }))
            #(flag_line(file).map(|flags| element! {
                Text(content: format!("flags:      {}", flags))
            }))
        }
    }
    .into_any()
}

#[derive(Default, Props)]
struct FileListProps {
    files: Vec<UploadedFile>,
}

#[component]
fn FileList(props: &FileListProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            #(props.files.iter().map(|file| element! {
                View(flex_direction: FlexDirection::Row) {
                    Text(content: "│ ")
                    Text(content: file.token.clone(), weight: Weight::Bold)
                    Text(content: format!("  {}  ({})", file.url, file.retention_period))
                }
            }))
        }
    }
}

#[derive(Default, Props)]
pub struct BucketViewProps {
    pub bucket: Option<Bucket>,
}

#[component]
pub fn BucketView(props: &BucketViewProps) -> impl Into<AnyElement<'static>> {
    let Some(bucket) = props.bucket.as_ref() else {
        return element!(View).into_any();
    };

    element! {
        View(flex_direction: FlexDirection::Column) {
            View(flex_direction: FlexDirection::Row) {
                Text(content: "┌ ")
                View(background_color: Color::Blue) {
                    Text(content: format!("Bucket {}", bucket.token), color: Color::White)
                }
            }
            Text(content: format!("│ {} file(s)", bucket.files.len()))
            FileList(files: bucket.files.clone())
            #(albums_section(&bucket.albums))
        }
    }
    .into_any()
}

fn albums_section(albums: &[AlbumInfo]) -> Option<AnyElement<'static>> {
    if albums.is_empty() {
        return None;
    }

    Some(
        element! {
            View(flex_direction: FlexDirection::Column) {
                Text(content: format!("│ {} album(s)", albums.len()))
                #(albums.iter().map(|album| element! {
                    View(flex_direction: FlexDirection::Row) {
                        Text(content: "│ ")
                        Text(content: album.token.clone(), weight: Weight::Bold)
                        Text(content: format!("  {}{}", album.name, if album.public_token.is_some() { " (shared)" } else { "" }))
                    }
                }))
            }
        }
        .into_any(),
    )
}

#[derive(Default, Props)]
pub struct AlbumViewProps {
    pub album: Option<Album>,
    pub public_base_url: Option<String>,
}

#[component]
pub fn AlbumView(props: &AlbumViewProps) -> impl Into<AnyElement<'static>> {
    let Some(album) = props.album.as_ref() else {
        return element!(View).into_any();
    };

    let share_line = match (&album.public_token, &props.public_base_url) {
        (Some(public), Some(base)) => Some(format!("│ shared at {}/album/{}", base.trim_end_matches('/'), public)),
        (Some(public), None) => Some(format!("│ public token: {}", public)),
        _ => None,
    };

    element! {
        View(flex_direction: FlexDirection::Column) {
            View(flex_direction: FlexDirection::Row) {
                Text(content: "┌ ")
                View(background_color: Color::Blue) {
                    Text(content: album.name.clone(), color: Color::White)
                }
            }
            Text(content: format!("│ token: {}", album.token))
            Text(content: format!("│ bucket: {}", album.bucket_token))
            #(share_line.map(|line| element! {
                Text(content: line)
            }))
            Text(content: format!("│ {} file(s)", album.files.len()))
            FileList(files: album.files.clone())
        }
    }
    .into_any()
}

#[derive(Default, Props)]
pub struct RestrictionsViewProps {
    pub restrictions: Option<Restrictions>,
}

#[component]
pub fn RestrictionsView(props: &RestrictionsViewProps) -> impl Into<AnyElement<'static>> {
    let Some(restrictions) = props.restrictions.as_ref() else {
        return element!(View).into_any();
    };

    let max_size = restrictions
        .max_file_size()
        .map(format_file_size)
        .unwrap_or_else(|| "unlimited".to_string());
    let banned = restrictions.banned_mime_types();

    element! {
        View(flex_direction: FlexDirection::Column) {
            Text(content: format!("Maximum file size: {}", max_size), weight: Weight::Bold)
            #((!banned.is_empty()).then(|| element! {
                Text(content: "Banned content types:")
            }))
            #(banned.into_iter().map(|mime| element! {
                Text(content: format!("  - {}", mime))
            }))
            #(restrictions.0.iter().filter(|r| r.kind != wvault::model::MAX_FILE_SIZE && r.kind != wvault::model::BANNED_MIME_TYPE).map(|r| element! {
                Text(content: format!("{}: {}", r.kind, r.value))
            }))
        }
    }
    .into_any()
}

#[derive(Default, Props)]
pub struct MessageProps {
    pub message: String,
}

#[component]
pub fn ErrorMessage(props: &MessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(content: "▲ ", color: Color::Red)
            Text(content: props.message.clone(), color: Color::Red)
        }
    }
}

#[component]
pub fn SuccessMessage(props: &MessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(content: "◆ ", color: Color::Green)
            Text(content: props.message.clone())
        }
    }
}

#[component]
pub fn ConfigHeader() -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            View(background_color: Color::Blue) {
                Text(content: " wvault configuration ", color: Color::White, weight: Weight::Bold)
            }
            Text(content: "Press enter to keep the value shown in brackets.")
        }
    }
}

#[derive(Default, Props)]
pub struct InputPromptProps {
    pub prompt: String,
    pub default: Option<String>,
    pub description: Option<String>,
}

#[component]
pub fn InputPrompt(props: &InputPromptProps) -> impl Into<AnyElement<'static>> {
    let prompt = match &props.default {
        Some(default) => format!("{} [{}]", props.prompt, default),
        None => props.prompt.clone(),
    };

    element! {
        View(flex_direction: FlexDirection::Column) {
            Text(content: "")
            Text(content: prompt, weight: Weight::Bold)
            #(props.description.as_ref().map(|description| element! {
                Text(content: description.clone(), color: Color::DarkGrey)
            }))
        }
    }
}
