//! `Accept` header negotiation for read routes.
//!
//! Read routes offer a fixed menu: JSON first, then an XLSX spreadsheet.
//! The client's media ranges are scored the usual way: quality first, then
//! the order the client listed them, then the order of the menu. The most
//! specific matching range decides a type's quality, so
//! `application/json;q=0, */*` excludes JSON but still accepts XLSX. A
//! missing or blank header means "anything", which resolves to JSON.

/// Representations a read route can produce.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MediaType {
    Json,
    Spreadsheet,
}

impl MediaType {
    /// The menu, in server preference order.
    pub const SUPPORTED: [MediaType; 2] = [MediaType::Json, MediaType::Spreadsheet];

    /// Bare `type/subtype`.
    pub fn essence(self) -> &'static str {
        match self {
            Self::Json        => "application/json",
            Self::Spreadsheet => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }

    /// Value for the `Content-Type` response header.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json        => "application/json; charset=utf-8",
            Self::Spreadsheet => self.essence(),
        }
    }

    fn parts(self) -> (&'static str, &'static str) {
        self.essence().split_once('/').unwrap_or((self.essence(), ""))
    }
}

/// Picks the best of [`MediaType::SUPPORTED`] for `accept`, or `None` when
/// nothing is acceptable (the caller answers 406).
pub fn negotiate(accept: Option<&str>) -> Option<MediaType> {
    negotiate_among(accept, &MediaType::SUPPORTED)
}

/// As [`negotiate`] but against an arbitrary menu.
pub fn negotiate_among(accept: Option<&str>, supported: &[MediaType]) -> Option<MediaType> {
    let ranges = match accept.map(str::trim) {
        None | Some("") => return supported.first().copied(),
        Some(header) => parse(header),
    };

    supported
        .iter()
        .enumerate()
        .filter_map(|(pos, &media)| {
            let (ty, sub) = media.parts();
            ranges
                .iter()
                .filter_map(|r| r.specificity(ty, sub).map(|s| (s, r)))
                // Most specific range wins; among equals, the first listed.
                .max_by(|(sa, ra), (sb, rb)| sa.cmp(sb).then(rb.index.cmp(&ra.index)))
                .map(|(_, r)| (media, r.q, r.index, pos))
        })
        .filter(|&(_, q, _, _)| q > 0.0)
        .min_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then(a.2.cmp(&b.2))
                .then(a.3.cmp(&b.3))
        })
        .map(|(media, ..)| media)
}

struct Range<'a> {
    ty: &'a str,
    sub: &'a str,
    q: f32,
    index: usize,
}

impl Range<'_> {
    fn specificity(&self, ty: &str, sub: &str) -> Option<u8> {
        match (self.ty, self.sub) {
            ("*", "*") => Some(0),
            (t, "*") if t.eq_ignore_ascii_case(ty) => Some(1),
            (t, s) if t.eq_ignore_ascii_case(ty) && s.eq_ignore_ascii_case(sub) => Some(2),
            _ => None,
        }
    }
}

fn parse(header: &str) -> Vec<Range<'_>> {
    header
        .split(',')
        .enumerate()
        .filter_map(|(index, item)| {
            let mut params = item.split(';');
            let range = params.next()?.trim();
            let (ty, sub) = match range.split_once('/') {
                Some((t, s)) => (t.trim(), s.trim()),
                None if range == "*" => ("*", "*"),
                None => return None,
            };
            let q = params
                .filter_map(|p| p.split_once('='))
                .find(|(k, _)| k.trim().eq_ignore_ascii_case("q"))
                .and_then(|(_, v)| v.trim().parse::<f32>().ok())
                .unwrap_or(1.0)
                .clamp(0.0, 1.0);
            Some(Range { ty, sub, q, index })
        })
        .collect()
}
