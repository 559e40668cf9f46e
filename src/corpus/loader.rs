use std::{
    fmt,
    fs::{self, File},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use csv::StringRecord;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{Article, Corpus, User};
use crate::util::{text::split_history, time::parse_timestamp};

const NEWS_PAGE_COLUMNS: [&str; 2] = ["Page", "page"];
const NEWS_DATE_COLUMNS: [&str; 2] = ["date", "issued"];
const USER_ID_COLUMNS: [&str; 2] = ["userId", "userid"];

/// パーティションファイルの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    News,
    Users,
}

impl PartitionKind {
    /// ファイル名の固定プレフィックス。
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::News => "itens-parte",
            Self::Users => "treino_parte",
        }
    }

    fn matches(self, file_name: &str) -> bool {
        file_name.starts_with(self.prefix()) && file_name.ends_with(".csv")
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::News => write!(f, "news ({}*.csv)", self.prefix()),
            Self::Users => write!(f, "user ({}*.csv)", self.prefix()),
        }
    }
}

#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("no {kind} partitions found in {}", dir.display())]
    MissingInputData { kind: PartitionKind, dir: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{} is missing required column {column}", path.display())]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("{}:{line}: unparseable publication timestamp {value:?}", path.display())]
    InvalidTimestamp {
        path: PathBuf,
        line: u64,
        value: String,
    },
}

/// ディレクトリからパーティション分割された CSV を読み込み、コーパスを組み立てる。
#[derive(Debug, Clone, Copy)]
pub struct CorpusLoader {
    loaded_at: DateTime<Utc>,
}

impl CorpusLoader {
    /// `loaded_at` は公開日時を持たない記事に割り当てる時刻。
    #[must_use]
    pub fn new(loaded_at: DateTime<Utc>) -> Self {
        Self { loaded_at }
    }

    /// # Errors
    /// どちらかの種類のパーティションが存在しない場合は [`PrepareError::MissingInputData`]。
    /// 読み込み・パースの失敗もそのまま返す。
    pub fn load(&self, dir: &Path) -> Result<Corpus, PrepareError> {
        let news_files = discover_partitions(dir, PartitionKind::News)?;
        let user_files = discover_partitions(dir, PartitionKind::Users)?;
        info!(
            news_partitions = news_files.len(),
            user_partitions = user_files.len(),
            dir = %dir.display(),
            "discovered corpus partitions"
        );

        // rayon の collect は入力順を保つので、連結順はファイル名順のまま
        let articles: Vec<Article> = news_files
            .par_iter()
            .map(|path| self.read_news_partition(path))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();
        let users: Vec<User> = user_files
            .par_iter()
            .map(|path| read_user_partition(path))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();

        let raw_articles = articles.len();
        let raw_users = users.len();
        let corpus = Corpus::new(articles, users);
        info!(
            articles = corpus.articles().len(),
            duplicate_articles = raw_articles - corpus.articles().len(),
            users = corpus.users().len(),
            duplicate_users = raw_users - corpus.users().len(),
            "corpus loaded"
        );
        Ok(corpus)
    }

    fn read_news_partition(&self, path: &Path) -> Result<Vec<Article>, PrepareError> {
        let mut reader = open_csv(path)?;
        let headers = read_headers(&mut reader, path)?;

        let page_col = require_column(&headers, &NEWS_PAGE_COLUMNS, "Page", path)?;
        let title_col = require_column(&headers, &["title"], "title", path)?;
        let body_col = require_column(&headers, &["body"], "body", path)?;
        let caption_col = find_column(&headers, &["caption"]);
        let url_col = find_column(&headers, &["url"]);
        let date_col = find_column(&headers, &NEWS_DATE_COLUMNS);
        if date_col.is_none() {
            warn!(
                path = %path.display(),
                "no publication date column, defaulting to load time"
            );
        }

        let mut articles = Vec::new();
        let mut skipped = 0usize;
        for result in reader.records() {
            let record = result.map_err(|source| PrepareError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            let page = field(&record, Some(page_col)).trim();
            if page.is_empty() {
                skipped += 1;
                continue;
            }

            let published_at = match date_col.map(|col| field(&record, Some(col)).trim()) {
                None | Some("") => self.loaded_at,
                Some(raw) => {
                    parse_timestamp(raw).ok_or_else(|| PrepareError::InvalidTimestamp {
                        path: path.to_path_buf(),
                        line: record.position().map_or(0, csv::Position::line),
                        value: raw.to_string(),
                    })?
                }
            };
            let caption = caption_col
                .map(|col| field(&record, Some(col)).to_string())
                .filter(|caption| !caption.is_empty());

            articles.push(Article {
                page: page.to_string(),
                title: field(&record, Some(title_col)).to_string(),
                body: field(&record, Some(body_col)).to_string(),
                caption,
                published_at,
                url: field(&record, url_col).trim().to_string(),
            });
        }

        log_partition(path, PartitionKind::News, articles.len(), skipped);
        Ok(articles)
    }
}

fn read_user_partition(path: &Path) -> Result<Vec<User>, PrepareError> {
    let mut reader = open_csv(path)?;
    let headers = read_headers(&mut reader, path)?;

    let user_col = require_column(&headers, &USER_ID_COLUMNS, "userId", path)?;
    let history_col = require_column(&headers, &["history"], "history", path)?;

    let mut users = Vec::new();
    let mut skipped = 0usize;
    for result in reader.records() {
        let record = result.map_err(|source| PrepareError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let user_id = field(&record, Some(user_col)).trim();
        if user_id.is_empty() {
            skipped += 1;
            continue;
        }
        users.push(User {
            user_id: user_id.to_string(),
            history: split_history(field(&record, Some(history_col))),
        });
    }

    log_partition(path, PartitionKind::Users, users.len(), skipped);
    Ok(users)
}

/// `dir` 直下から `kind` に一致するファイルを名前順で列挙する。
fn discover_partitions(dir: &Path, kind: PartitionKind) -> Result<Vec<PathBuf>, PrepareError> {
    let io_error = |source| PrepareError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        let Some(file_name) = entry.file_name().to_str().map(ToString::to_string) else {
            continue;
        };
        if kind.matches(&file_name) && entry.file_type().map_err(io_error)?.is_file() {
            files.push(entry.path());
        }
    }

    if files.is_empty() {
        return Err(PrepareError::MissingInputData {
            kind,
            dir: dir.to_path_buf(),
        });
    }
    files.sort();
    Ok(files)
}

fn open_csv(path: &Path) -> Result<csv::Reader<File>, PrepareError> {
    let file = File::open(path).map_err(|source| PrepareError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(file))
}

fn read_headers(reader: &mut csv::Reader<File>, path: &Path) -> Result<StringRecord, PrepareError> {
    reader
        .headers()
        .cloned()
        .map_err(|source| PrepareError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

/// 候補名のうち最初に見つかった列。`page`/`Page` のような表記揺れを吸収する。
fn find_column(headers: &StringRecord, candidates: &[&str]) -> Option<usize> {
    candidates
        .iter()
        .find_map(|candidate| headers.iter().position(|header| header == *candidate))
}

fn require_column(
    headers: &StringRecord,
    candidates: &[&str],
    canonical: &'static str,
    path: &Path,
) -> Result<usize, PrepareError> {
    find_column(headers, candidates).ok_or_else(|| PrepareError::MissingColumn {
        path: path.to_path_buf(),
        column: canonical,
    })
}

fn field(record: &StringRecord, column: Option<usize>) -> &str {
    column
        .and_then(|col| record.get(col))
        .unwrap_or_default()
}

fn log_partition(path: &Path, kind: PartitionKind, rows: usize, skipped: usize) {
    if skipped > 0 {
        warn!(
            path = %path.display(),
            %kind,
            skipped,
            "skipped rows with a blank key"
        );
    }
    debug!(path = %path.display(), %kind, rows, "partition parsed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) {
        let mut file = File::create(dir.path().join(name)).expect("create fixture");
        file.write_all(contents.as_bytes()).expect("write fixture");
    }

    fn loaded_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn lowercase_headers_are_unified() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "itens-parte1.csv",
            "page,url,title,body,caption,date\n\
             n1,https://g1/n1,Title,Body,Cap,2024-04-30 10:00:00\n",
        );
        write(&dir, "treino_parte1.csv", "userid,history\nu1,\"n1, n1\"\n");

        let corpus = CorpusLoader::new(loaded_at()).load(dir.path()).unwrap();

        let article = corpus.article("n1").expect("article indexed");
        assert_eq!(article.caption.as_deref(), Some("Cap"));
        assert_eq!(
            article.published_at,
            Utc.with_ymd_and_hms(2024, 4, 30, 10, 0, 0).unwrap()
        );
        assert_eq!(corpus.user("u1").unwrap().history, vec!["n1", "n1"]);
    }

    #[test]
    fn missing_date_column_defaults_to_load_time() {
        let dir = TempDir::new().unwrap();
        write(&dir, "itens-parte1.csv", "Page,url,title,body\nn1,u,T,B\n");
        write(&dir, "treino_parte1.csv", "userId,history\nu1,n1\n");

        let corpus = CorpusLoader::new(loaded_at()).load(dir.path()).unwrap();

        assert_eq!(corpus.article("n1").unwrap().published_at, loaded_at());
        assert_eq!(corpus.article("n1").unwrap().caption, None);
    }

    #[test]
    fn issued_column_is_accepted_as_publication_date() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "itens-parte1.csv",
            "page,url,issued,title,body\nn1,u,2024-04-01 00:00:00+00:00,T,B\n",
        );
        write(&dir, "treino_parte1.csv", "userId,history\nu1,n1\n");

        let corpus = CorpusLoader::new(loaded_at()).load(dir.path()).unwrap();

        assert_eq!(
            corpus.article("n1").unwrap().published_at,
            Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn missing_user_partitions_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(&dir, "itens-parte1.csv", "Page,url,title,body\nn1,u,T,B\n");

        let error = CorpusLoader::new(loaded_at())
            .load(dir.path())
            .expect_err("users are required");

        assert!(matches!(
            error,
            PrepareError::MissingInputData {
                kind: PartitionKind::Users,
                ..
            }
        ));
    }

    #[test]
    fn missing_news_partitions_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(&dir, "treino_parte1.csv", "userId,history\nu1,n1\n");

        let error = CorpusLoader::new(loaded_at())
            .load(dir.path())
            .expect_err("news is required");

        assert!(matches!(
            error,
            PrepareError::MissingInputData {
                kind: PartitionKind::News,
                ..
            }
        ));
    }

    #[test]
    fn unparseable_timestamp_is_reported_with_location() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "itens-parte1.csv",
            "Page,url,title,body,date\nn1,u,T,B,2024-01-01\nn2,u,T,B,not-a-date\n",
        );
        write(&dir, "treino_parte1.csv", "userId,history\nu1,n1\n");

        let error = CorpusLoader::new(loaded_at())
            .load(dir.path())
            .expect_err("bad date should fail");

        match error {
            PrepareError::InvalidTimestamp { line, value, .. } => {
                assert_eq!(line, 3);
                assert_eq!(value, "not-a-date");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_required_column_is_reported() {
        let dir = TempDir::new().unwrap();
        write(&dir, "itens-parte1.csv", "Page,url,title\nn1,u,T\n");
        write(&dir, "treino_parte1.csv", "userId,history\nu1,n1\n");

        let error = CorpusLoader::new(loaded_at())
            .load(dir.path())
            .expect_err("body is required");

        assert!(matches!(
            error,
            PrepareError::MissingColumn { column: "body", .. }
        ));
    }

    #[test]
    fn partitions_are_concatenated_in_file_name_order() {
        let dir = TempDir::new().unwrap();
        write(&dir, "itens-parte2.csv", "Page,url,title,body\nn1,u,second,B\n");
        write(&dir, "itens-parte1.csv", "Page,url,title,body\nn1,u,first,B\nn2,u,T,B\n");
        write(&dir, "notes.csv", "Page,url,title,body\nn9,u,T,B\n");
        write(&dir, "treino_parte1.csv", "userId,history\nu1,n1\n");

        let corpus = CorpusLoader::new(loaded_at()).load(dir.path()).unwrap();

        assert_eq!(corpus.articles().len(), 2);
        assert_eq!(corpus.article("n1").unwrap().title, "first");
        assert!(corpus.article("n9").is_none());
    }
}
