/// Whether `url` counts as a distraction: a case-insensitive substring match
/// against any blocklist entry. An empty entry matches every URL, just as
/// the redirect rule compiled from it covers every page.
pub fn classify<S: AsRef<str>>(url: &str, blocklist: &[S]) -> bool {
    let url = url.to_lowercase();
    blocklist
        .iter()
        .map(|entry| AsRef::<str>::as_ref(entry))
        .any(|entry| url.contains(&entry.to_lowercase()))
}
