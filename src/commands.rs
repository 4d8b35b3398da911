//! CLI commands.
//!
//! Each subcommand maps onto one or more service calls made through the
//! shared [`AppState`]. Output goes to stdout; errors are returned to `main`,
//! which prints them and persists whatever session is left.

use std::path::{Path, PathBuf};

use chrono::Local;
use clap::Subcommand;

use crate::api::error::ApiError;
use crate::chat::{self, ChatMessage, ChatSearch};
use crate::services::chats::{self, Question};
use crate::services::documents::{self, DocumentPage, DocumentRevision, NewDocument, UploadFile};
use crate::services::users;
use crate::state::AppState;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in and save the session in the OS keychain
    Login {
        /// Username or email (defaults to the last one used)
        #[arg(long, short)]
        user: Option<String>,
        #[arg(long, env = "DOCASSIST_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the saved session
    Logout,
    /// Show the signed-in user and their privileges
    Whoami,
    /// Manage documents
    #[command(subcommand)]
    Documents(DocumentCommand),
    /// Manage chat sessions
    #[command(subcommand)]
    Chats(ChatCommand),
    /// Ask the assistant a question
    Ask {
        /// Question text (optional with --voice)
        question: Option<String>,
        /// Continue an existing session
        #[arg(long)]
        session: Option<String>,
        /// Ask with a recorded audio file instead of text
        #[arg(long)]
        voice: Option<PathBuf>,
        /// Restrict the answer to one document type
        #[arg(long)]
        document_type: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DocumentCommand {
    /// List documents
    List {
        #[arg(long)]
        page: Option<u64>,
        /// List archived documents instead
        #[arg(long)]
        inactive: bool,
    },
    /// Print a document's details as JSON
    Show { id: String },
    /// Save the original file
    Download {
        id: String,
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Upload a new document
    Upload {
        file: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long)]
        code: String,
        #[arg(long)]
        department_id: String,
        #[arg(long)]
        type_id: String,
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        unit: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        issue_date: Option<String>,
    },
    /// Upload a new version of a document
    NewVersion {
        id: String,
        #[command(flatten)]
        revision: RevisionArgs,
    },
    /// Edit the current version of a document
    Edit {
        id: String,
        #[command(flatten)]
        revision: RevisionArgs,
    },
    /// Archive a document
    Delete { id: String },
    /// Restore an archived document
    Restore { id: String },
    /// List departments
    Departments,
    /// List document types
    Types,
}

#[derive(clap::Args, Debug)]
pub struct RevisionArgs {
    #[arg(long)]
    pub file: Option<PathBuf>,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub code: Option<String>,
    #[arg(long)]
    pub version: Option<String>,
    #[arg(long)]
    pub unit: Option<String>,
    #[arg(long)]
    pub branch: Option<String>,
    #[arg(long)]
    pub department_id: Option<String>,
    #[arg(long)]
    pub type_id: Option<String>,
    /// YYYY-MM-DD
    #[arg(long)]
    pub issue_date: Option<String>,
}

impl RevisionArgs {
    async fn into_revision(self) -> Result<DocumentRevision, ApiError> {
        let file = match self.file {
            Some(path) => Some(UploadFile::from_path(&path).await?),
            None => None,
        };
        Ok(DocumentRevision {
            file,
            title: self.title,
            code: self.code,
            version: self.version,
            unit: self.unit,
            branch: self.branch,
            department_id: self.department_id,
            type_id: self.type_id,
            issue_date: self.issue_date,
        })
    }
}

#[derive(Subcommand, Debug)]
pub enum ChatCommand {
    /// List sessions grouped by recency
    List {
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 20)]
        page_size: u64,
    },
    /// Start an empty session
    New,
    /// Print a session's conversation
    Show { id: String },
    Rename { id: String, title: String },
    Delete { id: String },
    /// Find sessions by title, or by message content with --content
    Search {
        query: String,
        #[arg(long)]
        content: bool,
    },
}

pub async fn run(state: &AppState, command: Command) -> Result<(), ApiError> {
    match command {
        Command::Login { user, password } => login(state, user, &password).await,
        Command::Logout => {
            state.logout().await;
            println!("Logged out.");
            Ok(())
        }
        Command::Whoami => whoami(state).await,
        Command::Documents(cmd) => run_documents(state, cmd).await,
        Command::Chats(cmd) => run_chats(state, cmd).await,
        Command::Ask {
            question,
            session,
            voice,
            document_type,
        } => {
            let voice = match voice {
                Some(path) => Some(UploadFile::from_path(&path).await?),
                None => None,
            };
            let question = Question {
                text: question.unwrap_or_default(),
                voice,
                document_type,
            };
            ask(state, session.as_deref(), question).await
        }
    }
}

async fn login(state: &AppState, user: Option<String>, password: &str) -> Result<(), ApiError> {
    let username = user.or_else(|| state.last_username()).ok_or_else(|| {
        ApiError::LoginFailed("No username given, pass --user".to_string())
    })?;
    log::info!("Logging in as {}", username);
    let user = state.login(&username, password).await?;
    println!("Logged in as {} ({}).", user.display_name(), user.username);
    Ok(())
}

async fn whoami(state: &AppState) -> Result<(), ApiError> {
    let user = state.current_user().await?;
    println!("{} <{}>", user.display_name(), user.email);
    println!("Username:  {}", user.username);
    println!("Role:      {:?}", users::primary_role(&user));
    println!("Groups:    {}", user.groups.join(", "));
    println!("Admin:     {}", state.is_admin().await?);
    println!("Download:  {}", state.can_download().await?);
    Ok(())
}

async fn run_documents(state: &AppState, command: DocumentCommand) -> Result<(), ApiError> {
    let api = &state.api;
    match command {
        DocumentCommand::List { page, inactive } => {
            let page = if inactive {
                documents::list_inactive_page(api, page.unwrap_or(1)).await?
            } else if let Some(page) = page {
                documents::list_page(api, page).await?
            } else {
                let docs = documents::list_all(api).await?;
                for doc in &docs {
                    print_document_row(doc);
                }
                return Ok(());
            };
            print_document_page(&page);
        }
        DocumentCommand::Show { id } => {
            let detail = documents::detail(api, &id).await?;
            print_json(&detail);
        }
        DocumentCommand::Download { id, out } => {
            let bytes = documents::download(api, &id).await?;
            save_file(&out, &bytes).await?;
            println!("Saved {} bytes to {}", bytes.len(), out.display());
        }
        DocumentCommand::Upload {
            file,
            title,
            code,
            department_id,
            type_id,
            version,
            unit,
            branch,
            issue_date,
        } => {
            let document = NewDocument {
                file: UploadFile::from_path(&file).await?,
                title,
                code,
                version,
                unit,
                branch,
                department_id,
                type_id,
                issue_date,
            };
            let created = documents::upload(api, document).await?;
            print_json(&created);
        }
        DocumentCommand::NewVersion { id, revision } => {
            let revision = revision.into_revision().await?;
            let updated = documents::upload_version(api, &id, revision).await?;
            print_json(&updated);
        }
        DocumentCommand::Edit { id, revision } => {
            let revision = revision.into_revision().await?;
            let updated = documents::update_version(api, &id, revision).await?;
            print_json(&updated);
        }
        DocumentCommand::Delete { id } => {
            documents::soft_delete(api, &id).await?;
            println!("Document {} archived.", id);
        }
        DocumentCommand::Restore { id } => {
            documents::restore(api, &id).await?;
            println!("Document {} restored.", id);
        }
        DocumentCommand::Departments => {
            for department in documents::departments(api).await? {
                print_named(&department);
            }
        }
        DocumentCommand::Types => {
            for doc_type in documents::document_types(api).await? {
                print_named(&doc_type);
            }
        }
    }
    Ok(())
}

async fn run_chats(state: &AppState, command: ChatCommand) -> Result<(), ApiError> {
    let api = &state.api;
    match command {
        ChatCommand::List { page, page_size } => {
            let sessions = chats::list_sessions(api, page, page_size).await?;
            if sessions.is_empty() {
                println!("No chat sessions.");
            }
            for (group, members) in chat::group_sessions(&sessions, &Local::now()) {
                println!("{}", group);
                for session in members {
                    println!("  {:<12} {}", session.id, session.title);
                }
            }
        }
        ChatCommand::New => {
            let session = chats::create_session(api).await?;
            println!("Created session {}", session.id);
        }
        ChatCommand::Show { id } => {
            let history = chats::session_messages(api, &id).await?;
            let messages = chat::transform_history(&history, api.base_url());
            print_conversation(&messages);
        }
        ChatCommand::Rename { id, title } => {
            chats::rename_session(api, &id, &title).await?;
            println!("Session {} renamed.", id);
        }
        ChatCommand::Delete { id } => {
            chats::delete_session(api, &id).await?;
            println!("Session {} deleted.", id);
        }
        ChatCommand::Search { query, content } => {
            let sessions = chats::all_sessions(api).await?;
            let search = ChatSearch::new();
            let hits = if content {
                search.search_with_content(api, &sessions, &query).await
            } else {
                search.search_titles(&sessions, &query)
            };
            for session in &hits {
                println!("{:<12} {}", session.id, session.title);
            }
            println!("{} session(s) found.", hits.len());
        }
    }
    Ok(())
}

async fn ask(state: &AppState, session: Option<&str>, question: Question) -> Result<(), ApiError> {
    let exchange = chats::ask(&state.api, session, question).await?;
    let messages = chat::transform_exchange(&exchange, state.api.base_url(), None);
    for message in messages.iter().filter(|m| m.is_bot()) {
        print_bot_message(message);
    }
    if messages.len() == 1 {
        println!("(no answer yet)");
    }
    Ok(())
}

/// Write downloaded bytes, creating parent directories as needed.
pub async fn save_file(path: &Path, bytes: &[u8]) -> Result<(), ApiError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

fn print_document_row(doc: &documents::Document) {
    println!(
        "{:<10} {:<40} {:<6} v{:<4} {}",
        doc.id, doc.title, doc.department, doc.version, doc.published_date
    );
}

fn print_document_page(page: &DocumentPage) {
    for doc in &page.documents {
        print_document_row(doc);
    }
    match page.total_pages {
        Some(total) => println!("Page {} of {}", page.current_page, total),
        None => println!(
            "Page {}{}",
            page.current_page,
            if page.has_next_page { " (more available)" } else { "" }
        ),
    }
}

fn print_named(value: &serde_json::Value) {
    let id = match value.get("id") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let name = value
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    println!("{:<6} {}", id, name);
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}

fn print_bot_message(message: &ChatMessage) {
    println!("{}", message.content);
    if let Some(name) = &message.file_name {
        match &message.published_date {
            Some(date) => println!("  source: {} ({})", name, date),
            None => println!("  source: {}", name),
        }
    }
}

fn print_conversation(messages: &[ChatMessage]) {
    for turn in chat::group_turns(messages) {
        let question = if turn.user.is_voice {
            format!("[voice] {}", turn.user.voice_url.as_deref().unwrap_or_default())
        } else {
            turn.user.content.clone()
        };
        println!("[{}] > {}", turn.user.timestamp, question);
        for bot in &turn.bots {
            print_bot_message(bot);
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::credentials::{now_ms, CredentialPair};
    use crate::config::Config;
    use clap::Parser;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(subcommand)]
        command: Command,
    }

    fn logged_in(server: &MockServer) -> AppState {
        let state = AppState::in_memory(&Config {
            api_base_url: server.uri(),
            ..Config::default()
        });
        state.api.set_credentials(CredentialPair {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at_ms: Some(now_ms() + 3_600_000),
        });
        state
    }

    #[test]
    fn test_parses_nested_subcommands() {
        let cli = TestCli::parse_from(["docassist", "chats", "search", "leave", "--content"]);
        assert!(matches!(
            cli.command,
            Command::Chats(ChatCommand::Search { ref query, content: true }) if query == "leave"
        ));

        let cli = TestCli::parse_from([
            "docassist",
            "documents",
            "edit",
            "12",
            "--title",
            "New title",
            "--issue-date",
            "2024-01-02",
        ]);
        match cli.command {
            Command::Documents(DocumentCommand::Edit { id, revision }) => {
                assert_eq!(id, "12");
                assert_eq!(revision.title.as_deref(), Some("New title"));
                assert_eq!(revision.issue_date.as_deref(), Some("2024-01-02"));
                assert!(revision.file.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/documents/7/download/"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"contents".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("doc.pdf");
        let state = logged_in(&server);

        run(
            &state,
            Command::Documents(DocumentCommand::Download {
                id: "7".to_string(),
                out: out.clone(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read(&out).unwrap(), b"contents");
    }

    #[tokio::test]
    async fn test_unauthorized_command_requires_login() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/whoami"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let state = logged_in(&server);
        let err = run(&state, Command::Whoami).await.unwrap_err();
        assert!(err.requires_login());
        assert!(!state.api.is_authenticated());
    }

    #[tokio::test]
    async fn test_ask_with_missing_voice_file_fails_before_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"body": null})))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let state = logged_in(&server);
        let result = run(
            &state,
            Command::Ask {
                question: None,
                session: None,
                voice: Some(dir.path().join("missing.webm")),
                document_type: None,
            },
        )
        .await;
        assert!(matches!(result, Err(ApiError::Io(_))));
    }
}
