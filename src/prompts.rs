//! Prompts for vision-model résumé ranking.
//!
//! Keeping prompt text here means the wording can change without touching
//! the retry and timeout logic in [`crate::analyze`], and tests can inspect
//! the prompts without a live model.
//!
//! Callers can override the system prompt via
//! [`crate::config::AnalysisConfig::system_prompt`]; the constant below is
//! used only when no override is provided.

use crate::analyze::JobPosting;

/// Default system prompt for comparative résumé ranking.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an experienced technical recruiter. You will receive one job description and a set of résumé images, one image per candidate, in a fixed order.

Follow these rules precisely:

1. READING
   - Read every résumé image completely, including small print
   - Identify each candidate by the name printed on the résumé; if no name is visible, use "Candidate N" where N is the image's 1-based position

2. EVALUATION
   - Judge each candidate only against the job description
   - Weigh required skills, relevant experience, seniority and education
   - Ignore photos, age, gender, nationality and other protected attributes

3. RANKING
   - Rank all candidates from best match (rank 1) to weakest match
   - Give each a match percentage from 0 to 100
   - No two candidates share a rank

4. OUTPUT FORMAT
   - Output ONLY a JSON object, no commentary and no code fences
   - Shape: {"job_post_id": "<id>", "candidates": [{"rank": 1, "name": "...", "image_index": 1, "match_percentage": 87, "summary": "..."}]}
   - Keep each summary to one or two sentences"#;

/// Build the user-turn text that accompanies the résumé images.
pub fn ranking_prompt(job: &JobPosting) -> String {
    format!(
        "Job post ID: {}\n\nJob description:\n\"\"\"{}\"\"\"\n\nRank the candidates in the attached résumé images.",
        job.post_id,
        job.description.trim()
    )
}
