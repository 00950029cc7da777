//! Central evaluation engine.
//!
//! Runs each answer through the subjective or coding path, the optional LLM
//! assessor, the combiner and the mark scaler, then resolves groups and
//! ranks students for whole-paper grading.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::aggregate::SubmissionAggregator;
use crate::analyzer::DimensionAnalyzer;
use crate::assessor::LlmAssessor;
use crate::code::{CodeDimensionAnalyzer, CODE_WEIGHTS};
use crate::combiner::{compose_feedback, merge_breakdown, transformer_score, ScoreCombiner};
use crate::embedding::Embedder;
use crate::error::{ConfigurationError, Degradation};
use crate::groups::{GroupResolver, QuestionMark};
use crate::model::{
    AnswerInput, DimensionScores, EvaluationResult, EvaluationSource, QuestionType,
};
use crate::parser::{merge_by_student, QuestionPaper, Submission};
use crate::profile::{ProfileMatch, SubjectProfileResolver};
use crate::report::{AnswerWarning, GradingReport, PaperSummary, StudentReport};
use crate::scaling::MarkScaler;
use crate::statistics::compute_analytics;
use crate::traits::{AssessmentRequest, CodeRunner};
use crate::validation::{answer_warnings, check_question};

/// Engine settings (the `[engine]` config section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Weight of the LLM score in hybrid mode.
    pub hybrid_weight: f64,
    /// Maximum answers evaluated concurrently.
    pub parallelism: usize,
    /// OCR confidence below this flags the result for review.
    pub low_confidence_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hybrid_weight: crate::combiner::DEFAULT_HYBRID_WEIGHT,
            parallelism: 4,
            low_confidence_threshold: 0.5,
        }
    }
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_evaluation_complete(&self, student: &str, result: &EvaluationResult);
    fn on_grading_complete(&self, students: usize, answers: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_evaluation_complete(&self, _: &str, _: &EvaluationResult) {}
    fn on_grading_complete(&self, _: usize, _: usize, _: Duration) {}
}

/// Scores produced before the LLM opinion is folded in.
struct LocalScore {
    transformer: f64,
    dimensions: DimensionScores,
    notes: Vec<String>,
    notices: Vec<Degradation>,
}

/// The central evaluation engine.
pub struct EvaluationEngine {
    analyzer: DimensionAnalyzer,
    profiles: SubjectProfileResolver,
    code: CodeDimensionAnalyzer,
    assessor: Option<LlmAssessor>,
    combiner: ScoreCombiner,
    config: EngineConfig,
}

impl EvaluationEngine {
    /// Engine with no code runner and no LLM. Both are added with the
    /// `with_*` methods.
    pub fn new(
        config: EngineConfig,
        profiles: SubjectProfileResolver,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            analyzer: DimensionAnalyzer::new(embedder),
            profiles,
            code: CodeDimensionAnalyzer::new(None, Duration::from_secs(5)),
            assessor: None,
            combiner: ScoreCombiner::new(config.hybrid_weight)?,
            config,
        })
    }

    pub fn with_runner(mut self, runner: Arc<dyn CodeRunner>, timeout: Duration) -> Self {
        self.code = CodeDimensionAnalyzer::new(Some(runner), timeout);
        self
    }

    pub fn with_assessor(mut self, assessor: LlmAssessor) -> Self {
        self.assessor = Some(assessor);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn has_assessor(&self) -> bool {
        self.assessor.is_some()
    }

    /// Evaluate one answer.
    ///
    /// Only a broken question (no model answer, invalid max marks) is an
    /// error; everything else yields a possibly degraded result.
    pub async fn evaluate(&self, input: &AnswerInput) -> Result<EvaluationResult, ConfigurationError> {
        let question = &input.question;
        check_question(question)?;

        let mut notices = Vec::new();
        let mut low_confidence = false;
        if let Some(confidence) = input.ocr_confidence {
            if confidence < self.config.low_confidence_threshold {
                tracing::warn!(
                    question = %question.id,
                    confidence,
                    "low OCR confidence, flagging for review"
                );
                notices.push(Degradation::LowOcrConfidence {
                    confidence,
                    threshold: self.config.low_confidence_threshold,
                });
                low_confidence = true;
            }
        }

        if input.is_empty() {
            tracing::warn!(question = %question.id, "empty answer, awarding zero");
            notices.push(Degradation::EmptyAnswer);
            let dimensions = match question.question_type {
                QuestionType::Subjective => self.analyzer.analyze("", &question.model_answer).scores,
                QuestionType::Coding => DimensionScores::new(CODE_WEIGHTS.map(|(d, _)| (d, 0.0))),
            };
            return Ok(EvaluationResult::new(
                question.id.clone(),
                0.0,
                0.0,
                0.0,
                question.max_marks,
                dimensions,
                "No answer was provided.".to_string(),
                EvaluationSource::Transformer,
                true,
                notices,
                None,
            ));
        }

        let llm = async {
            match &self.assessor {
                Some(assessor) => Some(assessor.assess(&self.assessment_request(input)).await),
                None => None,
            }
        };
        let (local, outcome) = tokio::join!(self.local_score(input), llm);

        notices.extend(local.notices);
        let opinion = match outcome {
            Some(outcome) => {
                if let Some(err) = &outcome.failure {
                    if outcome.opinion.is_none() {
                        notices.push(Degradation::from(err));
                    }
                }
                outcome.opinion
            }
            None => None,
        };

        let (final_score, source) = self.combiner.combine(local.transformer, opinion.as_ref());
        let dimensions = merge_breakdown(&local.dimensions, opinion.as_ref());
        let feedback = compose_feedback(final_score, &local.dimensions, opinion.as_ref(), &local.notes);
        let marks = MarkScaler.scale(final_score, question.max_marks);

        tracing::info!(
            question = %question.id,
            final_score,
            marks,
            max_marks = question.max_marks,
            %source,
            "evaluation complete"
        );

        Ok(EvaluationResult::new(
            question.id.clone(),
            final_score,
            local.transformer,
            marks,
            question.max_marks,
            dimensions,
            feedback,
            source,
            low_confidence,
            notices,
            opinion,
        ))
    }

    async fn local_score(&self, input: &AnswerInput) -> LocalScore {
        let question = &input.question;
        match question.question_type {
            QuestionType::Subjective => {
                let profile = self.profiles.resolve(&question.subject_area);
                let mut notices = Vec::new();
                if profile.matched == ProfileMatch::Fallback {
                    notices.push(Degradation::UnknownSubjectProfile {
                        requested: question.subject_area.clone(),
                    });
                }
                let analysis = self.analyzer.analyze(input.text(), &question.model_answer);
                LocalScore {
                    transformer: transformer_score(&analysis.scores, &profile.weights),
                    dimensions: analysis.scores,
                    notes: Vec::new(),
                    notices,
                }
            }
            QuestionType::Coding => {
                let analysis = self
                    .code
                    .analyze(input.text(), &question.model_answer, input.language_hint)
                    .await;
                LocalScore {
                    transformer: analysis.score,
                    dimensions: analysis.scores,
                    notes: analysis.notes,
                    notices: analysis.notices,
                }
            }
        }
    }

    fn assessment_request(&self, input: &AnswerInput) -> AssessmentRequest {
        let question = &input.question;
        let subject_area = match (question.question_type, question.subject_area.trim()) {
            (QuestionType::Coding, "") => "programming".to_string(),
            (_, subject) => subject.to_string(),
        };
        AssessmentRequest {
            question_text: question.text.clone(),
            model_answer_text: question.model_answer.clone(),
            student_answer_text: input.text().to_string(),
            subject_area,
            max_marks: question.max_marks,
        }
    }

    /// Evaluate many answers concurrently; results come back in input order.
    pub async fn evaluate_many(
        &self,
        inputs: &[AnswerInput],
    ) -> Vec<Result<EvaluationResult, ConfigurationError>> {
        self.evaluate_batch(inputs, |_, _| {}).await
    }

    async fn evaluate_batch<F>(
        &self,
        inputs: &[AnswerInput],
        mut on_done: F,
    ) -> Vec<Result<EvaluationResult, ConfigurationError>>
    where
        F: FnMut(usize, &Result<EvaluationResult, ConfigurationError>),
    {
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut futures = FuturesUnordered::new();
        for (i, input) in inputs.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                (i, self.evaluate(input).await)
            });
        }

        let mut slots: Vec<Option<Result<EvaluationResult, ConfigurationError>>> =
            (0..inputs.len()).map(|_| None).collect();
        while let Some((i, result)) = futures.next().await {
            on_done(i, &result);
            slots[i] = Some(result);
        }
        slots.into_iter().flatten().collect()
    }

    /// Grade every submission against a paper.
    ///
    /// Submissions sharing a student name are merged first, so each student
    /// is totalled once. Fails only when the paper itself is unusable.
    pub async fn grade_paper(
        &self,
        paper: &QuestionPaper,
        submissions: &[Submission],
        progress: &dyn ProgressReporter,
    ) -> Result<GradingReport> {
        let start = Instant::now();
        for question in &paper.questions {
            check_question(question)?;
        }
        let submissions = merge_by_student(submissions.to_vec());

        let mut owners = Vec::new();
        let mut inputs = Vec::new();
        for (s, submission) in submissions.iter().enumerate() {
            for input in submission.answer_inputs(paper) {
                owners.push(s);
                inputs.push(input);
            }
        }

        let results = self
            .evaluate_batch(&inputs, |i, result| {
                if let Ok(result) = result {
                    progress.on_evaluation_complete(&submissions[owners[i]].student_name, result);
                }
            })
            .await;

        let resolver = GroupResolver::new(&paper.questions);
        let mut per_student: Vec<StudentReport> = submissions
            .iter()
            .map(|s| StudentReport {
                student_name: s.student_name.clone(),
                submitted_at: s.submitted_at,
                evaluations: Vec::new(),
                resolved: Default::default(),
                warnings: Vec::new(),
            })
            .collect();
        let mut marks: Vec<HashMap<String, QuestionMark>> = vec![HashMap::new(); submissions.len()];

        for ((owner, input), result) in owners.iter().zip(&inputs).zip(results) {
            let result = result?;
            let report = &mut per_student[*owner];
            for message in answer_warnings(input.text()) {
                report.warnings.push(AnswerWarning {
                    question_id: input.question.id.clone(),
                    message,
                });
            }
            marks[*owner].insert(
                input.question.id.clone(),
                QuestionMark {
                    marks_awarded: result.marks_awarded(),
                    attempted: !input.is_empty(),
                },
            );
            report.evaluations.push(result);
        }

        let mut aggregator = SubmissionAggregator::new();
        for (report, marks) in per_student.iter_mut().zip(&marks) {
            report.resolved = resolver.resolve(marks);
            aggregator.add_all(&report.student_name, &report.resolved.questions);
        }
        let totals = aggregator.finish();

        let subjects: HashMap<&str, String> = paper
            .questions
            .iter()
            .map(|q| (q.id.as_str(), subject_label(&q.subject_area)))
            .collect();
        let analytics = compute_analytics(
            &totals,
            per_student.iter().flat_map(|s| {
                s.evaluations.iter().map(|e| {
                    let subject = subjects
                        .get(e.question_id())
                        .map_or("general", |s| s.as_str());
                    (subject, e)
                })
            }),
        );

        let elapsed = start.elapsed();
        progress.on_grading_complete(submissions.len(), inputs.len(), elapsed);
        tracing::info!(
            paper = %paper.id,
            students = submissions.len(),
            answers = inputs.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "paper graded"
        );

        Ok(GradingReport {
            id: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            paper: PaperSummary {
                id: paper.id.clone(),
                name: paper.name.clone(),
                question_count: paper.questions.len(),
                total_marks: resolver.resolve(&HashMap::new()).total_possible_marks,
            },
            students: per_student,
            totals,
            analytics,
            duration_ms: elapsed.as_millis() as u64,
        })
    }
}

fn subject_label(subject_area: &str) -> String {
    let label = subject_area.trim().to_lowercase();
    if label.is_empty() {
        "general".to_string()
    } else {
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessor::AssessorConfig;
    use crate::embedding::HashingEmbedder;
    use crate::error::LlmError;
    use crate::model::{LlmOpinion, QuestionUnit};
    use crate::parser::SubmittedAnswer;
    use crate::traits::{CaseOutcome, CaseVerdict, ExecutionReport, ExecutionRequest, LlmGrader};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedGrader {
        result: Result<LlmOpinion, LlmError>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmGrader for FixedGrader {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn assess(&self, _: &AssessmentRequest) -> Result<LlmOpinion, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    struct PassingRunner;

    #[async_trait]
    impl CodeRunner for PassingRunner {
        fn supports(&self, _: crate::model::Language) -> bool {
            true
        }

        async fn run_cases(&self, request: &ExecutionRequest) -> anyhow::Result<ExecutionReport> {
            Ok(ExecutionReport {
                cases: request
                    .cases
                    .iter()
                    .map(|c| CaseOutcome {
                        verdict: CaseVerdict::Passed,
                        stdout: c.expected.clone().unwrap_or_default(),
                        stderr: String::new(),
                        exit_code: Some(0),
                        duration_ms: 1,
                    })
                    .collect(),
            })
        }
    }

    const PHOTOSYNTHESIS: &str = "Photosynthesis is the process by which green plants use sunlight, water and carbon dioxide to produce glucose and oxygen. It takes place in the chloroplasts, where chlorophyll absorbs light energy.";

    fn question(id: &str, max: f64) -> QuestionUnit {
        QuestionUnit {
            id: id.into(),
            text: "Explain photosynthesis.".into(),
            model_answer: PHOTOSYNTHESIS.into(),
            max_marks: max,
            question_type: QuestionType::Subjective,
            subject_area: "science".into(),
            main_question_number: 1,
            sub_question: None,
            or_group_id: None,
        }
    }

    fn engine() -> EvaluationEngine {
        EvaluationEngine::new(
            EngineConfig::default(),
            SubjectProfileResolver::default(),
            Arc::new(HashingEmbedder::default()),
        )
        .unwrap()
    }

    fn with_grader(result: Result<LlmOpinion, LlmError>) -> (EvaluationEngine, Arc<FixedGrader>) {
        let grader = Arc::new(FixedGrader {
            result,
            calls: AtomicU32::new(0),
        });
        let engine = engine().with_assessor(LlmAssessor::new(
            grader.clone(),
            AssessorConfig {
                requests_per_minute: 0,
                max_retry_wait: Duration::from_millis(1),
                ..AssessorConfig::default()
            },
        ));
        (engine, grader)
    }

    fn opinion(score: f64) -> LlmOpinion {
        LlmOpinion {
            score,
            strengths: vec!["mentions chlorophyll".into()],
            weaknesses: vec![],
            missing_points: vec!["no equation".into()],
            summary: None,
            dimension_scores: DimensionScores::default(),
        }
    }

    #[tokio::test]
    async fn identical_answer_gets_full_marks() {
        let input = AnswerInput::new(question("q1", 10.0), PHOTOSYNTHESIS);
        let result = engine().evaluate(&input).await.unwrap();
        assert!(result.dimension_breakdown().get("semantic") > 99.0);
        assert!((result.final_score() - 1.0).abs() < 1e-9);
        assert_eq!(result.marks_awarded(), 10.0);
        assert_eq!(result.source(), EvaluationSource::Transformer);
        assert!(!result.low_confidence());
    }

    #[tokio::test]
    async fn empty_answer_is_zero_and_flagged() {
        let (engine, grader) = with_grader(Ok(opinion(1.0)));
        let input = AnswerInput::new(question("q1", 10.0), "   ");
        let result = engine.evaluate(&input).await.unwrap();
        assert_eq!(result.marks_awarded(), 0.0);
        assert!(result.dimension_breakdown().all_zero());
        assert_eq!(result.dimension_breakdown().len(), 4);
        assert!(result.low_confidence());
        assert_eq!(result.notices(), &[Degradation::EmptyAnswer]);
        assert_eq!(grader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_model_answer_aborts() {
        let mut q = question("q1", 10.0);
        q.model_answer = " ".into();
        let err = engine()
            .evaluate(&AnswerInput::new(q, "answer"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingModelAnswer { .. }));
    }

    #[tokio::test]
    async fn hybrid_mode_blends_llm_score() {
        let (engine, _) = with_grader(Ok(opinion(0.5)));
        let input = AnswerInput::new(question("q1", 10.0), "Plants make glucose from sunlight in chloroplasts.");
        let result = engine.evaluate(&input).await.unwrap();
        assert_eq!(result.source(), EvaluationSource::Hybrid);
        let expected = 0.6 * 0.5 + 0.4 * result.transformer_score();
        assert!((result.final_score() - expected).abs() < 1e-12);
        assert!(result.feedback_text().contains("Missing points: no equation."));
        assert!(result.llm_opinion().is_some());
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_transformer_exactly() {
        let (engine, grader) = with_grader(Err(LlmError::Rejected(
            "authentication failed".into(),
        )));
        let input = AnswerInput::new(question("q1", 10.0), "Plants make glucose from sunlight.");
        let result = engine.evaluate(&input).await.unwrap();
        assert_eq!(result.source(), EvaluationSource::Transformer);
        assert_eq!(result.final_score().to_bits(), result.transformer_score().to_bits());
        assert!(result
            .notices()
            .iter()
            .any(|n| matches!(n, Degradation::LlmUnavailable { .. })));
        assert_eq!(grader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn low_ocr_confidence_flags_result() {
        let input = AnswerInput::new(question("q1", 10.0), PHOTOSYNTHESIS).with_ocr_confidence(0.3);
        let result = engine().evaluate(&input).await.unwrap();
        assert!(result.low_confidence());
        assert!(matches!(
            result.notices()[0],
            Degradation::LowOcrConfidence { .. }
        ));
        assert_eq!(result.marks_awarded(), 10.0);
    }

    #[tokio::test]
    async fn unknown_subject_is_recorded() {
        let mut q = question("q1", 10.0);
        q.subject_area = "astrology".into();
        let result = engine()
            .evaluate(&AnswerInput::new(q, "Plants use light."))
            .await
            .unwrap();
        assert!(result.notices().contains(&Degradation::UnknownSubjectProfile {
            requested: "astrology".into()
        }));
    }

    #[tokio::test]
    async fn coding_answer_uses_code_path() {
        let model = "# test: [1,2,3,4,5,6] -> 12\ndef sum_even(nums):\n    # even only\n    return sum(n for n in nums if n % 2 == 0)\n";
        let mut q = question("c1", 5.0);
        q.question_type = QuestionType::Coding;
        q.model_answer = model.into();
        q.subject_area = "programming".into();
        let engine = engine().with_runner(Arc::new(PassingRunner), Duration::from_secs(5));
        let result = engine
            .evaluate(&AnswerInput::new(q, model).with_language(crate::model::Language::Python))
            .await
            .unwrap();
        assert_eq!(result.dimension_breakdown().get("execution"), 100.0);
        assert_eq!(result.marks_awarded(), 5.0);
    }

    #[tokio::test]
    async fn evaluate_many_preserves_order() {
        let inputs: Vec<AnswerInput> = (0..6)
            .map(|i| AnswerInput::new(question(&format!("q{i}"), 5.0), PHOTOSYNTHESIS))
            .collect();
        let results = engine().evaluate_many(&inputs).await;
        let ids: Vec<String> = results
            .iter()
            .map(|r| r.as_ref().unwrap().question_id().to_string())
            .collect();
        assert_eq!(ids, vec!["q0", "q1", "q2", "q3", "q4", "q5"]);
    }

    #[tokio::test]
    async fn grade_paper_resolves_groups_and_ranks() {
        let mut q1 = question("q1", 10.0);
        q1.or_group_id = Some("g1".into());
        let mut q2 = question("q2", 10.0);
        q2.or_group_id = Some("g1".into());
        let mut q3 = question("q3", 5.0);
        q3.main_question_number = 2;
        let paper = QuestionPaper {
            id: "bio".into(),
            name: "Biology".into(),
            default_subject: "science".into(),
            questions: vec![q1, q2, q3],
        };
        let answer = |q: &str, text: &str| SubmittedAnswer {
            question_id: q.into(),
            text: Some(text.into()),
            ocr_confidence: None,
            language: None,
        };
        let submissions = vec![
            Submission {
                student_name: "Ben".into(),
                submitted_at: None,
                sheet: None,
                answers: vec![answer("q3", "")],
            },
            Submission {
                student_name: "Asha".into(),
                submitted_at: None,
                sheet: None,
                answers: vec![
                    answer("q1", PHOTOSYNTHESIS),
                    answer("q2", PHOTOSYNTHESIS),
                    answer("q3", PHOTOSYNTHESIS),
                ],
            },
        ];

        let report = engine()
            .grade_paper(&paper, &submissions, &NoopReporter)
            .await
            .unwrap();
        assert_eq!(report.paper.total_marks, 15.0);
        let asha = report.total_for("Asha").unwrap();
        assert_eq!(asha.total_marks, 15.0);
        assert_eq!(asha.total_possible_marks, 15.0);
        assert_eq!(asha.percentage, 100.0);
        assert_eq!(asha.rank, 1);
        let ben = report.total_for("Ben").unwrap();
        assert_eq!(ben.total_marks, 0.0);
        assert_eq!(ben.rank, 2);
        assert!(report
            .student("Ben")
            .unwrap()
            .warnings
            .iter()
            .any(|w| w.message == "answer is empty"));
        assert_eq!(report.analytics.student_count, 2);
    }

    #[tokio::test]
    async fn repeated_student_is_totalled_once() {
        let paper = QuestionPaper {
            id: "bio".into(),
            name: "Biology".into(),
            default_subject: "science".into(),
            questions: vec![question("q1", 5.0), {
                let mut q2 = question("q2", 5.0);
                q2.main_question_number = 2;
                q2
            }],
        };
        let answer = |q: &str| SubmittedAnswer {
            question_id: q.into(),
            text: Some(PHOTOSYNTHESIS.into()),
            ocr_confidence: None,
            language: None,
        };
        let submissions = vec![
            Submission {
                student_name: "Asha".into(),
                submitted_at: None,
                sheet: None,
                answers: vec![answer("q1")],
            },
            Submission {
                student_name: "Asha ".into(),
                submitted_at: None,
                sheet: None,
                answers: vec![answer("q2")],
            },
        ];

        let report = engine()
            .grade_paper(&paper, &submissions, &NoopReporter)
            .await
            .unwrap();
        assert_eq!(report.totals.len(), 1);
        assert_eq!(report.students.len(), 1);
        let asha = report.total_for("Asha").unwrap();
        assert_eq!(asha.total_possible_marks, 10.0);
        assert_eq!(asha.total_marks, 10.0);
        assert_eq!(asha.percentage, 100.0);
        assert_eq!(report.student("Asha").unwrap().evaluations.len(), 2);
    }
}
