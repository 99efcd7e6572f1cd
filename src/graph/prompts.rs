//! Prompt templates for the graph nodes and the simple pipeline.

use crate::graph::state::QueryAnalysis;

pub fn query_analysis(query: &str) -> String {
    format!(
        r#"Analyze the following question and extract structured information.

Question: {query}

Return the analysis as JSON in exactly this shape:
{{
    "intent": "main intent of the question (factual/analytical/comparative/procedural)",
    "complexity": "complexity of the question (simple/medium/complex)",
    "entities": ["key entities"],
    "keywords": ["keywords to search for"],
    "requires_multiple_steps": true or false,
    "clarification_needed": true or false,
    "suggested_queries": ["narrower search queries"]
}}"#
    )
}

pub fn query_rewrite(query: &str, analysis: &QueryAnalysis) -> String {
    let analysis_json = serde_json::to_string(analysis).unwrap_or_else(|_| analysis.summary());
    format!(
        r#"Rewrite the original question into search queries for document retrieval.

Original question: {query}
Analysis: {analysis_json}

Write 1-3 search queries, one per line, following these rules:
1. Include the key terms
2. Be specific and unambiguous
3. Phrase them for search, not for conversation

Rewritten queries:"#
    )
}

pub fn relevance(query: &str, title: &str, content: &str) -> String {
    let excerpt: String = content.chars().take(500).collect();
    format!(
        r#"Rate how relevant the following document is to the question.

Question: {query}

Document:
Title: {title}
Content: {excerpt}

Give a relevance score from 0 to 10 and explain why.
Documents scoring below 7 are excluded.

Evaluation:
Score: [0-10]
Reason: [explanation]"#
    )
}

pub fn answer(query: &str, intent: &str, context: &str) -> String {
    format!(
        r#"Answer the question accurately and helpfully using the provided context.

Question: {query}

Detected intent: {intent}

Relevant documents:
{context}

Guidelines:
1. Stay grounded in the context
2. Structure the explanation logically
3. Explain step by step where useful
4. Say so when information is uncertain

Answer:"#
    )
}

pub fn refinement(query: &str, initial_answer: &str, additional_context: &str) -> String {
    format!(
        r#"Improve the following answer.

Original question: {query}
Initial answer: {initial_answer}
Additional context: {additional_context}

Improve it by:
1. Checking accuracy
2. Making it more complete
3. Making it clearer
4. Adding important missing information

Improved answer:"#
    )
}

pub fn simple_qa(query: &str, context: &str) -> String {
    format!(
        r#"Answer the question using the context below.

Context:
{context}

Question: {query}

Answer:"#
    )
}
