//! Plantillas de instrucciones enviadas al modelo de chat.
//!
//! Los textos de las plantillas van en inglés (es el idioma de los documentos
//! analizados); el nombre de la empresa siempre se interpola.

pub const SYSTEM_PROMPT: &str = "You are a financial analyst specializing in identifying business growth and contraction themes from corporate documents.";

pub const EXCERPTS_HEADER: &str = "Relevant document excerpts:";
pub const TRUNCATED_EXCERPTS_HEADER: &str = "Relevant document excerpts (truncated due to length):";

/// Instrucción de extracción de temas para un chunk.
pub fn theme_extraction(company: &str, source: &str, text: &str) -> String {
    format!(
        r#"You are analyzing a document from {company}'s investor relations or SEC filings.

Document source: {source}

Please identify key themes related to {company}'s business growth or contraction factors.
Focus on strategic initiatives, market trends, competitive factors, financial indicators,
content strategy, technology developments, and regulatory impacts.

For each theme:
1. Provide a concise name (1-5 words)
2. Write a brief description explaining how this theme relates to {company}'s business growth or contraction
3. Include specific evidence from the document that supports this theme

Format your response as a JSON object with a "themes" array of theme objects with the following structure:
{{
    "themes": [
        {{
            "name": "Theme Name",
            "description": "Description of how this theme impacts {company}'s business",
            "evidence": "Specific evidence from the document"
        }}
    ]
}}

Only include themes that are clearly supported by evidence in the document.

Document text:
{text}
"#
    )
}

/// Pregunta general sobre los temas.
pub fn qa_standard(
    company: &str,
    question: &str,
    theme_info: &str,
    excerpts_header: &str,
    context: &str,
) -> String {
    format!(
        r#"You are analyzing {company}'s investor relations and SEC filings to answer questions about business themes.

Question: {question}

Current extracted themes:
{theme_info}

Based on the following relevant document excerpts, provide a comprehensive answer to the question.
Include specific evidence and citations from the documents to support your answer.

{excerpts_header}
{context}
"#
    )
}

/// Pregunta sobre por qué un tema no aparece entre los extraídos.
pub fn qa_missing_theme(
    company: &str,
    question: &str,
    theme_info: &str,
    missing_theme: &str,
    excerpts_header: &str,
    context: &str,
) -> String {
    format!(
        r#"You are analyzing {company}'s investor relations and SEC filings to determine why a specific theme might not be included in the extracted themes.

Question: {question}

Current extracted themes:
{theme_info}

Based on the following relevant document excerpts, explain why "{missing_theme}" might not be included as a theme. Consider:
1. Is there sufficient evidence in the documents to support this as a significant business growth/contraction theme?
2. Is it possibly included under a different theme name or category?
3. Is it mentioned but not emphasized enough to be considered a key theme?

Provide specific evidence from the documents to support your explanation.

{excerpts_header}
{context}
"#
    )
}

/// Respaldo sin contexto documental cuando ni truncando cabe el prompt.
pub fn qa_themes_only(company: &str, question: &str, theme_info: &str) -> String {
    format!(
        r#"You are analyzing {company}'s investor relations and SEC filings to answer questions about business themes.

Question: {question}

Current extracted themes:
{theme_info}

I don't have enough context from the documents to provide a detailed answer.
Please provide the best answer you can based on the themes listed above.
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn company_name_is_interpolated() {
        let p = theme_extraction("Roku", "q1.pdf (part 1/2)", "Platform revenue grew.");
        assert!(p.contains("Roku's investor relations"));
        assert!(p.contains("Document source: q1.pdf (part 1/2)"));
        assert!(p.ends_with("Platform revenue grew.\n"));
        assert!(!p.contains("Netflix"));
    }

    #[test]
    fn missing_theme_template_names_the_theme() {
        let p = qa_missing_theme("Netflix", "why isn't 'gaming' listed?", "- A: b\n", "gaming", EXCERPTS_HEADER, "ctx");
        assert!(p.contains("explain why \"gaming\" might not be included"));
        assert!(p.contains("Relevant document excerpts:\nctx"));
    }
}
