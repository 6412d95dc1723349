//! Small SDP rewrites applied to local descriptions before they are sent.

/// Reorder the payload types of every `m=video` line so that the ones mapped
/// to `codec` (and their RTX retransmission types) are listed first.
///
/// `codec` may be a bare name (`H264`), a mime type (`video/VP9`) or a full
/// preference string with fmtp parameters; only the codec name is compared.
/// The SDP is returned unchanged when the codec is not offered.
pub fn prefer_codec(sdp: &str, codec: &str) -> String {
    let wanted = codec_name(codec);
    if wanted.is_empty() {
        return sdp.to_string();
    }

    let lines: Vec<&str> = sdp.lines().collect();
    let mut result = String::with_capacity(sdp.len());
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if !line.starts_with("m=video") {
            push_line(&mut result, line);
            i += 1;
            continue;
        }

        // attribute lines of this media section, up to the next m= line
        let section_end = lines[i + 1..]
            .iter()
            .position(|l| l.starts_with("m="))
            .map(|offset| i + 1 + offset)
            .unwrap_or(lines.len());
        let section = &lines[i + 1..section_end];

        push_line(&mut result, &reorder_media_line(line, section, &wanted));
        for attr in section {
            push_line(&mut result, attr);
        }
        i = section_end;
    }

    result
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push_str("\r\n");
}

fn codec_name(codec: &str) -> String {
    let name = codec.split_whitespace().next().unwrap_or_default();
    let name = name.rsplit('/').next().unwrap_or(name);
    name.to_ascii_uppercase()
}

fn reorder_media_line(m_line: &str, section: &[&str], wanted: &str) -> String {
    let mut parts = m_line.split(' ');
    // m=<media> <port> <proto> <fmt> ...
    let head: Vec<&str> = parts.by_ref().take(3).collect();
    let payloads: Vec<&str> = parts.collect();
    if head.len() < 3 {
        return m_line.to_string();
    }

    let preferred: Vec<&str> = section
        .iter()
        .filter_map(|l| l.strip_prefix("a=rtpmap:"))
        .filter_map(|rest| {
            let (pt, encoding) = rest.split_once(' ')?;
            let name = encoding.split('/').next()?;
            name.eq_ignore_ascii_case(wanted).then_some(pt)
        })
        .collect();
    if preferred.is_empty() {
        return m_line.to_string();
    }

    let rtx: Vec<&str> = section
        .iter()
        .filter_map(|l| l.strip_prefix("a=fmtp:"))
        .filter_map(|rest| {
            let (pt, params) = rest.split_once(' ')?;
            let apt = params
                .split(';')
                .find_map(|p| p.trim().strip_prefix("apt="))?;
            preferred.contains(&apt).then_some(pt)
        })
        .collect();

    let mut ordered: Vec<&str> = payloads
        .iter()
        .copied()
        .filter(|pt| preferred.contains(pt) || rtx.contains(pt))
        .collect();
    ordered.extend(
        payloads
            .iter()
            .copied()
            .filter(|pt| !preferred.contains(pt) && !rtx.contains(pt)),
    );

    let mut line = head.join(" ");
    for pt in ordered {
        line.push(' ');
        line.push_str(pt);
    }
    line
}
