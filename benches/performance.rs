//! 1万記事・2千ユーザーの合成コーパスでの準備と類似検索のベンチマーク。
use chrono::{TimeDelta, TimeZone, Utc};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use news_recommender::{Article, Corpus, PrepareOptions, Snapshot, User};

const TOPICS: [&str; 8] = [
    "futebol campeonato gol rodada",
    "economia juros inflação mercado",
    "política eleição congresso votação",
    "tecnologia celular aplicativo internet",
    "saúde vacina hospital doença",
    "chuva temperatura previsão frente",
    "cinema estreia festival ator",
    "trânsito acidente rodovia obras",
];

fn synthetic_corpus(articles: usize, users: usize) -> Corpus {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let articles: Vec<Article> = (0..articles)
        .map(|i| {
            let topic = TOPICS[i % TOPICS.len()];
            Article {
                page: format!("news-{i}"),
                title: format!("{topic} manchete {}", i % 97),
                body: format!("{topic} {topic} detalhe{} região{}", i % 131, i % 27),
                caption: None,
                published_at: now - TimeDelta::hours((i % 24 * 30) as i64),
                url: format!("https://g1.example/news-{i}"),
            }
        })
        .collect();
    let total = articles.len();
    let users: Vec<User> = (0..users)
        .map(|u| User {
            user_id: format!("user-{u}"),
            history: (0..(u % 15 + 1))
                .map(|k| format!("news-{}", (u * 37 + k * 101) % total))
                .collect(),
        })
        .collect();
    Corpus::new(articles, users)
}

fn bench_prepare(c: &mut Criterion) {
    let corpus = synthetic_corpus(10_000, 2_000);
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

    c.bench_function("prepare_snapshot_10k_articles", |b| {
        b.iter(|| {
            let snapshot =
                Snapshot::from_corpus(corpus.clone(), &PrepareOptions::default(), now);
            black_box(snapshot.content().dimension());
        });
    });
}

fn bench_queries(c: &mut Criterion) {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let snapshot = Snapshot::from_corpus(
        synthetic_corpus(10_000, 2_000),
        &PrepareOptions::default(),
        now,
    );

    c.bench_function("similar_top10_10k_articles", |b| {
        b.iter(|| black_box(snapshot.recommend_similar("news-42", 10).len()));
    });
    c.bench_function("personalized_top10", |b| {
        b.iter(|| black_box(snapshot.recommend_for_user_at("user-14", 10, now).len()));
    });
    c.bench_function("cold_start_top10", |b| {
        b.iter(|| black_box(snapshot.cold_start(10, now).len()));
    });
}

criterion_group!(benches, bench_prepare, bench_queries);
criterion_main!(benches);
