//! Git pkt-line inspection for the smart-HTTP proxy.
//!
//! Two jobs: scan the command section of a `git-receive-pack` request
//! body (the look-ahead push-safety gate buffers exactly this much
//! before deciding whether to forward anything upstream), and scan a
//! ref advertisement for the `symref=HEAD:<ref>` capability that names
//! the repository's default branch.
//!
//! Pkt-line framing: each frame starts with four ASCII hex digits
//! giving the total frame length including the four header bytes; the
//! zero-length frame `0000` (flush-pkt) terminates a section. A
//! receive-pack command section is a sequence of
//! `<old-oid> SP <new-oid> SP <refname>` lines (the first may carry a
//! NUL-separated capability list) ending at the first flush-pkt; the
//! packfile follows and is never parsed here.

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// The section terminator frame.
pub const FLUSH_PKT: &[u8] = b"0000";

/// Wire-format error: the bytes seen so far can never become valid.
#[derive(Debug, thiserror::Error)]
#[error("malformed pkt-line stream: {0}")]
pub struct WireError(pub String);

/// Frame a payload as a single pkt-line (used by tests and stub servers).
pub fn encode_pkt(data: &str) -> Vec<u8> {
    let len = data.len() + 4;
    assert!(len <= 0xffff, "pkt-line payload too large");
    let mut out = format!("{len:04x}").into_bytes();
    out.extend_from_slice(data.as_bytes());
    out
}

enum Frame<'a> {
    /// Not enough bytes buffered to finish the frame at `pos`.
    Incomplete,
    Flush {
        next: usize,
    },
    Data {
        payload: &'a [u8],
        next: usize,
    },
}

fn next_frame(buf: &[u8], pos: usize) -> Result<Frame<'_>, WireError> {
    if buf.len() < pos + 4 {
        return Ok(Frame::Incomplete);
    }
    let header = &buf[pos..pos + 4];
    let header_str = std::str::from_utf8(header)
        .map_err(|_| WireError("non-ASCII length header".into()))?;
    let len = usize::from_str_radix(header_str, 16)
        .map_err(|_| WireError(format!("invalid length header {header_str:?}")))?;

    if len == 0 {
        return Ok(Frame::Flush { next: pos + 4 });
    }
    if len < 4 {
        return Err(WireError(format!("reserved frame length {len}")));
    }
    if buf.len() < pos + len {
        return Ok(Frame::Incomplete);
    }
    Ok(Frame::Data {
        payload: &buf[pos + 4..pos + len],
        next: pos + len,
    })
}

// ---------------------------------------------------------------------------
// Receive-pack command section
// ---------------------------------------------------------------------------

/// One ref update command from a push request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub old_id: String,
    pub new_id: String,
    pub ref_name: String,
}

impl RefUpdate {
    /// An all-zero new object id deletes the ref.
    pub fn is_delete(&self) -> bool {
        self.new_id.bytes().all(|b| b == b'0')
    }

    /// Tag creation or update.
    pub fn is_tag(&self) -> bool {
        self.ref_name.starts_with("refs/tags/")
    }
}

/// Result of scanning an accumulating request-body prefix.
#[derive(Debug)]
pub enum CommandScan {
    /// The flush terminator has not arrived yet; buffer more bytes.
    Incomplete,
    /// Full command section observed. `section_len` is the byte length
    /// of the section including the terminating flush-pkt.
    Complete {
        commands: Vec<RefUpdate>,
        section_len: usize,
    },
}

/// Scan the buffered prefix of a receive-pack request body.
///
/// Call again with a longer buffer while `Incomplete`; the scan is
/// cheap at command-section sizes and chunk boundaries therefore cannot
/// change the outcome. `shallow <oid>` lines are skipped; anything else
/// that is not a well-formed command line is a hard error (the gate
/// cannot certify what it cannot parse).
pub fn scan_commands(buf: &[u8]) -> Result<CommandScan, WireError> {
    let mut commands = Vec::new();
    let mut pos = 0usize;

    loop {
        match next_frame(buf, pos)? {
            Frame::Incomplete => return Ok(CommandScan::Incomplete),
            Frame::Flush { next } => {
                return Ok(CommandScan::Complete {
                    commands,
                    section_len: next,
                })
            }
            Frame::Data { payload, next } => {
                let line = std::str::from_utf8(payload)
                    .map_err(|_| WireError("non-UTF-8 command line".into()))?;
                // The first command line carries a NUL-separated capability list.
                let line = line.split('\0').next().unwrap_or("");
                let line = line.trim_end_matches('\n');

                if !line.starts_with("shallow ") {
                    commands.push(parse_command(line)?);
                }
                pos = next;
            }
        }
    }
}

fn parse_command(line: &str) -> Result<RefUpdate, WireError> {
    let mut parts = line.splitn(3, ' ');
    let (old_id, new_id, ref_name) = match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), Some(c)) if !c.is_empty() => (a, b, c),
        _ => return Err(WireError(format!("unparseable command line {line:?}"))),
    };
    if !is_object_id(old_id) || !is_object_id(new_id) {
        return Err(WireError(format!("invalid object id in {line:?}")));
    }
    Ok(RefUpdate {
        old_id: old_id.to_string(),
        new_id: new_id.to_string(),
        ref_name: ref_name.to_string(),
    })
}

/// SHA-1 (40) or SHA-256 (64) hex object id.
fn is_object_id(s: &str) -> bool {
    (s.len() == 40 || s.len() == 64) && s.bytes().all(|b| b.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Push-safety gate
// ---------------------------------------------------------------------------

/// Session safety posture applied to a parsed command list.
#[derive(Debug, Clone, Copy)]
pub struct PushPolicy<'a> {
    /// Set by the approving owner at decision time.
    pub allow_default_branch: bool,
    /// Default-branch ref discovered from the advertisement, when known.
    pub default_branch: Option<&'a str>,
}

/// A blocked push, with its stable machine code.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct PushViolation {
    pub code: &'static str,
    pub message: String,
}

/// Reject deletes, tag updates, and (unless allowed) default-branch
/// updates. Deletes and tag updates are unconditional.
pub fn check_push_safety(
    commands: &[RefUpdate],
    policy: &PushPolicy<'_>,
) -> Result<(), PushViolation> {
    for cmd in commands {
        if cmd.is_delete() {
            return Err(PushViolation {
                code: "PUSH_DELETE_BLOCKED",
                message: format!("push deletes ref {}", cmd.ref_name),
            });
        }
        if cmd.is_tag() {
            return Err(PushViolation {
                code: "PUSH_TAG_BLOCKED",
                message: format!("push updates tag {}", cmd.ref_name),
            });
        }
        if let Some(default_branch) = policy.default_branch {
            if cmd.ref_name == default_branch && !policy.allow_default_branch {
                return Err(PushViolation {
                    code: "PUSH_DEFAULT_BRANCH_BLOCKED",
                    message: format!("push updates default branch {default_branch}"),
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Advertisement scanning
// ---------------------------------------------------------------------------

/// Find the default-branch ref in a ref advertisement.
///
/// The first advertised ref line carries a NUL-separated capability
/// list; `symref=HEAD:refs/heads/<name>` names the default branch.
/// Returns `None` when the capability is absent (receive-pack
/// advertisements never carry it) or the body is not a v0 advertisement.
pub fn discover_head_symref(advertisement: &[u8]) -> Option<String> {
    let mut pos = 0usize;

    while let Ok(frame) = next_frame(advertisement, pos) {
        let payload = match frame {
            Frame::Incomplete => return None,
            Frame::Flush { next } => {
                pos = next;
                continue;
            }
            Frame::Data { payload, next } => {
                pos = next;
                payload
            }
        };
        let Ok(line) = std::str::from_utf8(payload) else {
            return None;
        };
        let Some((_, caps)) = line.split_once('\0') else {
            continue;
        };
        for cap in caps.trim_end_matches('\n').split(' ') {
            if let Some(refname) = cap.strip_prefix("symref=HEAD:") {
                if !refname.is_empty() {
                    return Some(refname.to_string());
                }
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO_ID: &str = "0000000000000000000000000000000000000000";
    const OLD: &str = "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";
    const NEW: &str = "b6589fc6ab0dc82cf12099d1c2d40ab994e8410c";

    fn command_body(lines: &[&str]) -> Vec<u8> {
        let mut body = Vec::new();
        for line in lines {
            body.extend_from_slice(&encode_pkt(line));
        }
        body.extend_from_slice(FLUSH_PKT);
        body.extend_from_slice(b"PACK....");
        body
    }

    // -- Frame scanning ------------------------------------------------------

    #[test]
    fn scans_two_commands_and_stops_at_flush() {
        let body = command_body(&[
            &format!("{OLD} {NEW} refs/heads/feature\0report-status side-band-64k"),
            &format!("{OLD} {NEW} refs/heads/other"),
        ]);
        let scan = scan_commands(&body).unwrap();
        match scan {
            CommandScan::Complete {
                commands,
                section_len,
            } => {
                assert_eq!(commands.len(), 2);
                assert_eq!(commands[0].ref_name, "refs/heads/feature");
                assert_eq!(commands[1].ref_name, "refs/heads/other");
                assert_eq!(&body[section_len..], b"PACK....");
            }
            CommandScan::Incomplete => panic!("expected complete scan"),
        }
    }

    #[test]
    fn capability_list_is_stripped_from_first_line() {
        let body = command_body(&[&format!("{OLD} {NEW} refs/heads/main\0atomic quiet")]);
        let CommandScan::Complete { commands, .. } = scan_commands(&body).unwrap() else {
            panic!("expected complete scan");
        };
        assert_eq!(commands[0].ref_name, "refs/heads/main");
    }

    #[test]
    fn empty_command_section_is_complete() {
        let mut body = Vec::from(FLUSH_PKT);
        body.extend_from_slice(b"PACK");
        let CommandScan::Complete { commands, .. } = scan_commands(&body).unwrap() else {
            panic!("expected complete scan");
        };
        assert!(commands.is_empty());
    }

    #[test]
    fn shallow_lines_are_skipped() {
        let body = command_body(&[
            &format!("shallow {OLD}"),
            &format!("{OLD} {NEW} refs/heads/main"),
        ]);
        let CommandScan::Complete { commands, .. } = scan_commands(&body).unwrap() else {
            panic!("expected complete scan");
        };
        assert_eq!(commands.len(), 1);
    }

    // -- Chunk boundaries ------------------------------------------------------

    #[test]
    fn incomplete_at_any_cut_point() {
        let body = command_body(&[&format!("{OLD} {NEW} refs/heads/main")]);
        // Every prefix that ends before the flush terminator is Incomplete.
        let flush_end = body.len() - b"PACK....".len();
        for cut in 0..flush_end {
            match scan_commands(&body[..cut]) {
                Ok(CommandScan::Incomplete) => {}
                other => panic!("cut at {cut}: expected Incomplete, got {other:?}"),
            }
        }
        assert!(matches!(
            scan_commands(&body[..flush_end]),
            Ok(CommandScan::Complete { .. })
        ));
    }

    // -- Malformed input -------------------------------------------------------

    #[test]
    fn garbage_length_header_is_an_error() {
        assert!(scan_commands(b"zzzz").is_err());
    }

    #[test]
    fn reserved_length_is_an_error() {
        assert!(scan_commands(b"0002").is_err());
    }

    #[test]
    fn bad_object_id_is_an_error() {
        let body = command_body(&[&format!("nothex {NEW} refs/heads/main")]);
        assert!(scan_commands(&body).is_err());
    }

    #[test]
    fn missing_ref_name_is_an_error() {
        let body = command_body(&[&format!("{OLD} {NEW}")]);
        assert!(scan_commands(&body).is_err());
    }

    #[test]
    fn sha256_object_ids_are_accepted() {
        let old256 = "a".repeat(64);
        let new256 = "b".repeat(64);
        let body = command_body(&[&format!("{old256} {new256} refs/heads/main")]);
        assert!(matches!(
            scan_commands(&body),
            Ok(CommandScan::Complete { .. })
        ));
    }

    // -- Safety gate -----------------------------------------------------------

    fn update(old: &str, new: &str, r: &str) -> RefUpdate {
        RefUpdate {
            old_id: old.into(),
            new_id: new.into(),
            ref_name: r.into(),
        }
    }

    const OPEN_POLICY: PushPolicy<'static> = PushPolicy {
        allow_default_branch: false,
        default_branch: None,
    };

    #[test]
    fn delete_is_always_blocked() {
        let cmds = [update(OLD, ZERO_ID, "refs/heads/feature")];
        let violation = check_push_safety(&cmds, &OPEN_POLICY).unwrap_err();
        assert_eq!(violation.code, "PUSH_DELETE_BLOCKED");
    }

    #[test]
    fn tag_update_is_always_blocked() {
        let cmds = [update(OLD, NEW, "refs/tags/v1.0.0")];
        let violation = check_push_safety(&cmds, &OPEN_POLICY).unwrap_err();
        assert_eq!(violation.code, "PUSH_TAG_BLOCKED");
    }

    #[test]
    fn default_branch_blocked_without_flag() {
        let cmds = [update(OLD, NEW, "refs/heads/main")];
        let policy = PushPolicy {
            allow_default_branch: false,
            default_branch: Some("refs/heads/main"),
        };
        let violation = check_push_safety(&cmds, &policy).unwrap_err();
        assert_eq!(violation.code, "PUSH_DEFAULT_BRANCH_BLOCKED");
    }

    #[test]
    fn default_branch_allowed_with_flag() {
        let cmds = [update(OLD, NEW, "refs/heads/main")];
        let policy = PushPolicy {
            allow_default_branch: true,
            default_branch: Some("refs/heads/main"),
        };
        assert!(check_push_safety(&cmds, &policy).is_ok());
    }

    #[test]
    fn feature_branch_passes() {
        let cmds = [update(OLD, NEW, "refs/heads/feature")];
        let policy = PushPolicy {
            allow_default_branch: false,
            default_branch: Some("refs/heads/main"),
        };
        assert!(check_push_safety(&cmds, &policy).is_ok());
    }

    #[test]
    fn unknown_default_branch_gates_only_deletes_and_tags() {
        let cmds = [update(OLD, NEW, "refs/heads/main")];
        assert!(check_push_safety(&cmds, &OPEN_POLICY).is_ok());
    }

    // -- Advertisement scanning -------------------------------------------------

    fn upload_pack_advertisement(symref: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&encode_pkt("# service=git-upload-pack\n"));
        body.extend_from_slice(FLUSH_PKT);
        let caps = match symref {
            Some(r) => format!("multi_ack side-band-64k symref=HEAD:{r} agent=git/2.43.0"),
            None => "multi_ack side-band-64k agent=git/2.43.0".to_string(),
        };
        body.extend_from_slice(&encode_pkt(&format!("{NEW} HEAD\0{caps}\n")));
        body.extend_from_slice(&encode_pkt(&format!("{NEW} refs/heads/main\n")));
        body.extend_from_slice(FLUSH_PKT);
        body
    }

    #[test]
    fn discovers_default_branch_from_symref() {
        let adv = upload_pack_advertisement(Some("refs/heads/main"));
        assert_eq!(
            discover_head_symref(&adv),
            Some("refs/heads/main".to_string())
        );
    }

    #[test]
    fn no_symref_capability_yields_none() {
        let adv = upload_pack_advertisement(None);
        assert_eq!(discover_head_symref(&adv), None);
    }

    #[test]
    fn non_advertisement_bytes_yield_none() {
        assert_eq!(discover_head_symref(b"PACK garbage"), None);
        assert_eq!(discover_head_symref(b""), None);
    }
}
