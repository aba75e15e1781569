//! System prompts and fixed user-facing text.

pub const SUMMARIZE_STRUCTURE: &str = r#"Analyze the following list of file paths and produce a JSON structure that represents the file/folder hierarchy.
Do not wrap the JSON in a markdown code block.
For each file, include an object with metadata such as "type" and "size". For directories, nest their contents.

Example output:
{
  "dir1": {
    "file1.txt": {"type": "file", "size": 1234},
    "subdir": {
      "file2.txt": {"type": "file", "size": 5678}
    }
  }
}"#;

pub const RESEARCH_PLAN: &str = r#"You are an expert software engineer helping a user understand a GitHub repository.
Based on the conversation, write a research plan for answering the user's latest question about the codebase.
The plan has between 2 and 4 steps. Each step is one short, specific, actionable search question that can be answered by looking at source files, configuration or documentation in the repository.
Do not answer the question yourself."#;

pub const GENERATE_QUERIES: &str = r#"Generate search queries to find code and documentation in a repository that answer the question below.
Phrase the queries differently from each other: vary vocabulary, mention likely identifiers, file names or concepts. Do not repeat the same query."#;

pub const RESPONSE: &str = r#"You are a helpful assistant answering questions about a GitHub repository.
Answer the user's latest question using the repository context below. Cite file paths when they help. If the context does not contain the answer, say so rather than guessing.

<context>
{context}
</context>"#;

pub const PRESERVE_CODE_BLOCKS: &str =
    "IMPORTANT: Always preserve code blocks with their ``` fence markers and language tags. Never modify code content.";

pub const CONTINUE_SUFFIX: &str = "\n\nDo you have any more questions about this codebase? (yes/no)";

pub const QUESTION_PROMPT: &str =
    "Repository has been processed and is ready for questions! What would you like to know about this codebase?";

pub const CONTINUE_PROMPT: &str = "Do you have more questions about this codebase? Please answer yes or no.";

pub const GOODBYE: &str =
    "Thank you for using GitSurfer! Feel free to ask about other repositories anytime.";

pub fn error_message(error: &str) -> String {
    format!("Sorry, I encountered an error: {}", error)
}

/// Response system prompt with the retrieved context filled in.
pub fn response_prompt(context: &str) -> String {
    format!(
        "{}\n\n{}",
        RESPONSE.replace("{context}", context),
        PRESERVE_CODE_BLOCKS
    )
}

pub fn queries_prompt(n: usize) -> String {
    format!("{}\nReturn exactly {} queries.", GENERATE_QUERIES, n)
}
