/// Match `candidate` against a glob `pattern` where `*` matches any run of
/// zero or more characters and every other character matches literally.
///
/// Case-sensitive and total: empty inputs are valid, `*` matches everything.
pub fn matches(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();

    let (mut p, mut c) = (0, 0);
    // Position of the last `*` seen and the candidate index it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while c < candidate.len() {
        if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, c));
            p += 1;
        } else if p < pattern.len() && pattern[p] == candidate[c] {
            p += 1;
            c += 1;
        } else if let Some((star, tried)) = backtrack {
            // Let the last star swallow one more character and retry.
            p = star + 1;
            c = tried + 1;
            backtrack = Some((star, tried + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&ch| ch == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_everything() {
        for s in ["", "a", "network-east", "*", "with/slash", "ünïcode"] {
            assert!(matches("*", s), "`*` should match {s:?}");
        }
    }

    #[test]
    fn test_literal_matches_itself() {
        for s in ["", "a", "network-east", "a.b-c_d", "x/y"] {
            assert!(matches(s, s));
        }
        assert!(!matches("abc", "abd"));
        assert!(!matches("abc", "ab"));
        assert!(!matches("", "a"));
    }

    #[test]
    fn test_prefix_glob() {
        assert!(matches("ab*", "abc"));
        assert!(matches("ab*", "ab"));
        assert!(!matches("ab*", "xabc"));
    }

    #[test]
    fn test_inner_and_multiple_stars() {
        assert!(matches("network-*-prod", "network-east-prod"));
        assert!(!matches("network-*-prod", "network-east-dev"));
        assert!(matches("a*b*c", "aXXbYYc"));
        assert!(matches("a*b*c", "abc"));
        assert!(!matches("a*b*c", "acb"));
        assert!(matches("**", ""));
        assert!(matches("*a", "banana"));
        assert!(!matches("*a", "bananas"));
    }

    #[test]
    fn test_case_sensitive_and_no_regex() {
        assert!(!matches("ABC", "abc"));
        assert!(!matches("a.c", "abc"));
        assert!(matches("a.c", "a.c"));
        assert!(!matches("a?c", "abc"));
        assert!(!matches("[ab]", "a"));
    }
}
