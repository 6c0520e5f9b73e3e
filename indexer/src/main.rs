use anyhow::Result;
use clap::{Parser, Subcommand};
use notes_core::store::build_index;
use notes_core::{MeetingStore, NewMeeting, StorePaths};
use tracing_subscriber::{EnvFilter, fmt};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "notes-indexer")]
#[command(about = "Import meeting notes and query the keyword index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import meetings from JSON/JSONL files or a directory into the store
    Import {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Meeting store directory
        #[arg(long, default_value = "./data")]
        data: String,
    },
    /// Rebuild the index from the store and print ranked matches
    Search {
        #[arg(long, default_value = "./data")]
        data: String,
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ImportReport {
    imported: usize,
    skipped: usize,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Import { input, data } => {
            let store = MeetingStore::open(&StorePaths::new(&data))?;
            let report = import(Path::new(&input), &store)?;
            store.flush()?;
            tracing::info!(imported = report.imported, skipped = report.skipped, total = store.len(), "import complete");
            Ok(())
        }
        Commands::Search { data, query, limit } => search(&data, &query, limit),
    }
}

fn search(data: &str, query: &str, limit: usize) -> Result<()> {
    let store = MeetingStore::open(&StorePaths::new(data))?;
    let index = build_index(&store)?;
    let hits = index.ranked_search(query, limit);
    if hits.is_empty() {
        println!("no relevant meetings for {query:?}");
        return Ok(());
    }
    for hit in hits {
        let title = store.get(hit.doc_id)?.map(|m| m.title).unwrap_or_default();
        println!("{:>6}  score={}  {}", hit.doc_id, hit.score, title);
    }
    Ok(())
}

fn input_files(input: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

fn import(input: &Path, store: &MeetingStore) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for file in input_files(input) {
        tracing::info!(file = %file.display(), "importing");
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            import_jsonl(&file, store, &mut report)?;
        } else {
            import_json(&file, store, &mut report)?;
        }
    }
    Ok(report)
}

fn import_jsonl(file: &Path, store: &MeetingStore, report: &mut ImportReport) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let meeting: NewMeeting = serde_json::from_str(&line)?;
        ingest(meeting, store, report);
    }
    Ok(())
}

fn import_json(file: &Path, store: &MeetingStore, report: &mut ImportReport) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                ingest(serde_json::from_value(v)?, store, report);
            }
        }
        serde_json::Value::Object(_) => ingest(serde_json::from_value(json)?, store, report),
        _ => tracing::warn!(file = %file.display(), "expected a meeting object or array, skipping"),
    }
    Ok(())
}

fn ingest(meeting: NewMeeting, store: &MeetingStore, report: &mut ImportReport) {
    let title = meeting.title.clone();
    match store.create(meeting) {
        Ok(m) => {
            tracing::debug!(meeting_id = m.id, "imported");
            report.imported += 1;
        }
        Err(err) => {
            tracing::warn!(%title, error = %err, "skipping meeting");
            report.skipped += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn imports_json_and_jsonl_from_a_directory() {
        let input = tempdir().unwrap();
        fs::write(
            input.path().join("a.json"),
            r#"[{"title":"Kickoff","datetime":"2024-01-01T09:00:00Z","raw_notes":"project scope"},
                {"title":"Broken","datetime":"someday","raw_notes":"never stored"}]"#,
        )
        .unwrap();
        fs::write(
            input.path().join("b.jsonl"),
            "{\"title\":\"Sync\",\"datetime\":\"2024-01-02T09:00:00Z\",\"participants\":\"ana\",\"raw_notes\":\"scope creep\"}\n\n",
        )
        .unwrap();
        fs::write(input.path().join("ignored.txt"), "not json").unwrap();

        let data = tempdir().unwrap();
        let store = MeetingStore::open(&StorePaths::new(data.path())).unwrap();
        let report = import(input.path(), &store).unwrap();
        assert_eq!(report, ImportReport { imported: 2, skipped: 1 });

        let index = build_index(&store).unwrap();
        assert_eq!(index.search("scope").len(), 2);
        assert!(index.search("never").is_empty());
    }
}
