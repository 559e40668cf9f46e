//! テキスト処理ユーティリティ。
//!
//! 記事本文を TF-IDF 用のトークン列に変換します。
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// これより短いトークンは捨てる。
pub(crate) const MIN_TOKEN_CHARS: usize = 2;

/// テキストを小文字のトークン列に分割する。
///
/// NFC 正規化の後、Unicode UAX#29 の単語境界で分割します。
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = text.nfc().collect::<String>();
    normalized
        .unicode_words()
        .map(str::to_lowercase)
        .filter(|word| word.chars().count() >= MIN_TOKEN_CHARS)
        .collect()
}

/// カンマ区切りの閲覧履歴を記事IDの列に変換する。
#[must_use]
pub fn split_history(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ToString::to_string)
        .collect()
}
