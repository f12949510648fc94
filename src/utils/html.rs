/// Sanitises teacher-authored HTML (practice intros, question text).
///
/// Whitelist based: formatting tags such as <b> or <p> survive, <script>,
/// <iframe> and event-handler attributes are removed together with their content.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Strips every tag, for fields shown as plain labels (category and practice names).
pub fn plain_text(input: &str) -> String {
    ammonia::Builder::empty().clean(input).to_string().trim().to_string()
}
