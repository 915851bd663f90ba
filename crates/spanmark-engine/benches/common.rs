// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
#[allow(dead_code)]
pub fn generate_article(sections: usize) -> String {
    let mut markup = String::from("<article>");
    for section in 0..sections {
        markup.push_str(&format!(
            "<section><h2>Section {section}</h2>\
             <p>The quick brown fox jumps over the lazy dog near the river bank.</p>\
             <p>Another <em>paragraph</em> with <b>mixed</b> inline content for the index.</p>\
             </section>"
        ));
    }
    markup.push_str("</article>");
    markup
}
