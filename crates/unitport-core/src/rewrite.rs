//! Text rewrites applied to definition files before transfer

use std::collections::BTreeMap;
use unitport_block::Block;

/// Replace whole-token occurrences of renamed definitions
///
/// Field lines are rewritten after the `=`; other lines after their first
/// token, so block headers (`Type OldName`) are renamed but block types and
/// keys never are. Comments and line endings are preserved. Returns the new
/// text and the number of replaced tokens.
#[must_use]
pub fn apply_renames(text: &str, renames: &BTreeMap<String, String>) -> (String, usize) {
    if renames.is_empty() {
        return (text.to_string(), 0);
    }

    let mut out = String::with_capacity(text.len());
    let mut replaced = 0;

    for line in text.split_inclusive('\n') {
        let body_len = line.trim_end_matches(['\r', '\n']).len();
        let (body, eol) = line.split_at(body_len);

        if body.trim_start().starts_with("//") {
            out.push_str(line);
            continue;
        }

        let (code, comment) = body.find(';').map_or((body, ""), |i| body.split_at(i));
        let split = match code.find('=') {
            Some(eq) => eq + 1,
            None => first_token_end(code),
        };
        let (head, tail) = code.split_at(split);
        let (tail, count) = rewrite_tokens(tail, renames);

        out.push_str(head);
        out.push_str(&tail);
        out.push_str(comment);
        out.push_str(eol);
        replaced += count;
    }

    (out, replaced)
}

fn first_token_end(code: &str) -> usize {
    let leading = code.len() - code.trim_start().len();
    code[leading..]
        .find(char::is_whitespace)
        .map_or(code.len(), |i| leading + i)
}

fn rewrite_tokens(segment: &str, renames: &BTreeMap<String, String>) -> (String, usize) {
    let mut out = String::with_capacity(segment.len());
    let mut count = 0;
    let mut rest = segment;

    while !rest.is_empty() {
        let spaces = rest.len() - rest.trim_start().len();
        out.push_str(&rest[..spaces]);
        rest = &rest[spaces..];

        let token_len = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let token = &rest[..token_len];
        if let Some(new_name) = renames.get(token) {
            out.push_str(new_name);
            count += 1;
        } else {
            out.push_str(token);
        }
        rest = &rest[token_len..];
    }

    (out, count)
}

/// Drop the lines of top-level blocks that `keep` rejects
///
/// Lines outside blocks (comments, blank lines) are kept. `blocks` must come
/// from parsing `text`.
#[must_use]
pub fn retain_blocks(text: &str, blocks: &[Block], keep: impl Fn(&Block) -> bool) -> String {
    let dropped: Vec<(usize, usize)> = blocks
        .iter()
        .filter(|b| !keep(b))
        .map(|b| (b.start_line, b.end_line))
        .collect();
    if dropped.is_empty() {
        return text.to_string();
    }

    text.split_inclusive('\n')
        .enumerate()
        .filter(|(idx, _)| {
            let number = idx + 1;
            !dropped.iter().any(|(start, end)| (*start..=*end).contains(&number))
        })
        .map(|(_, line)| line)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use unitport_block::BlockParser;

    fn renames() -> BTreeMap<String, String> {
        [("TankGun", "ZH_TankGun"), ("Tank", "ZH_Tank")]
            .into_iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn renames_headers_and_values_only() {
        let text = "Object Tank\r\n  Weapon = PRIMARY TankGun ; TankGun here\r\n  TankGunner = Tank\r\nEnd\r\n";
        let (out, count) = apply_renames(text, &renames());
        assert_eq!(
            out,
            "Object ZH_Tank\r\n  Weapon = PRIMARY ZH_TankGun ; TankGun here\r\n  TankGunner = ZH_Tank\r\nEnd\r\n"
        );
        assert_eq!(count, 3);
    }

    #[test]
    fn partial_tokens_are_not_renamed() {
        let (out, count) = apply_renames("Weapon TankGunElite\n  Damage = 10\nEnd\n", &renames());
        assert_eq!(out, "Weapon TankGunElite\n  Damage = 10\nEnd\n");
        assert_eq!(count, 0);
    }

    #[test]
    fn block_type_matching_a_rename_is_kept() {
        let (out, _) = apply_renames("Tank Tank\nEnd", &renames());
        assert_eq!(out, "Tank ZH_Tank\nEnd");
    }

    #[test]
    fn comment_lines_are_untouched() {
        let (out, count) = apply_renames("// Tank\n; Tank\n", &renames());
        assert_eq!(out, "// Tank\n; Tank\n");
        assert_eq!(count, 0);
    }

    #[test]
    fn retains_selected_blocks_and_loose_lines() {
        let text = "; weapons\nWeapon A\n  Damage = 1\nEnd\n\nWeapon B\n  Damage = 2\nEnd\n";
        let outcome = BlockParser::default().parse(text);
        let out = retain_blocks(text, &outcome.blocks, |b| b.name == "B");
        assert_eq!(out, "; weapons\n\nWeapon B\n  Damage = 2\nEnd\n");
    }
}
