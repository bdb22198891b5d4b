//! Small helpers shared by the catalog modules.

/// Lowercase, ASCII-folded, hyphen-separated form of `text`.
///
/// Runs of anything that is not a letter or digit collapse into one hyphen;
/// leading and trailing hyphens are dropped. Common Latin diacritics are
/// folded (`Đắc Nhân Tâm` becomes `dac-nhan-tam`); other non-ASCII letters
/// are treated as separators.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for ch in text.chars().flat_map(char::to_lowercase) {
        let folded = fold_diacritic(ch);
        if folded.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(folded);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

fn fold_diacritic(ch: char) -> char {
    match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ạ' | 'ả' | 'ấ' | 'ầ' | 'ẩ' | 'ẫ' | 'ậ' | 'ă'
        | 'ắ' | 'ằ' | 'ẳ' | 'ẵ' | 'ặ' => 'a',
        'è' | 'é' | 'ê' | 'ë' | 'ẹ' | 'ẻ' | 'ẽ' | 'ế' | 'ề' | 'ể' | 'ễ' | 'ệ' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'ị' | 'ỉ' | 'ĩ' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ọ' | 'ỏ' | 'ố' | 'ồ' | 'ổ' | 'ỗ' | 'ộ' | 'ơ'
        | 'ớ' | 'ờ' | 'ở' | 'ỡ' | 'ợ' => 'o',
        'ù' | 'ú' | 'û' | 'ü' | 'ụ' | 'ủ' | 'ũ' | 'ư' | 'ứ' | 'ừ' | 'ử' | 'ữ' | 'ự' => 'u',
        'ý' | 'ÿ' | 'ỳ' | 'ỵ' | 'ỷ' | 'ỹ' => 'y',
        'ñ' => 'n',
        'ç' => 'c',
        'đ' => 'd',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_separators() {
        assert_eq!(slugify("  The Lord of the Rings: Vol. 1 "), "the-lord-of-the-rings-vol-1");
    }

    #[test]
    fn folds_diacritics() {
        assert_eq!(slugify("Đắc Nhân Tâm"), "dac-nhan-tam");
        assert_eq!(slugify("Cien años de soledad"), "cien-anos-de-soledad");
    }

    #[test]
    fn nothing_sluggable_is_empty() {
        assert_eq!(slugify("!!! ???"), "");
    }
}
