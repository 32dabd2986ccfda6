use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};
use unic_langid::LanguageIdentifier;

const ZH_CN: &str = r#"
# Agent turn
agent-escalation-apology = 抱歉，知识库中暂时没有找到能够解答这个问题的资料。我已将您的问题记录到待解答列表，技术人员补充资料后即可查询。如果方便，请补充具体的错误码或故障现象。
agent-model-failure = 抱歉，智能助手暂时无法连接模型服务，请稍后重试。（{ $reason }）
agent-step-limit = 抱歉，本次问题处理步骤过多，已自动结束。您的问题已记录，请稍后再试。
agent-escalation-recorded = 已记录待解答问题：{ $query }
agent-escalation-duplicate = 该问题已在待解答列表中：{ $query }
agent-escalation-failed = 记录待解答问题失败：{ $reason }
agent-forced-escalation-reason = 知识库检索结果不足以回答该问题
agent-step-limit-reason = 处理步骤达到上限，仍未得到答案
agent-tool-args-invalid = 工具参数无效：{ $reason }
agent-empty-response = 抱歉，这次没有生成有效的回答，请换一种方式描述您的问题。

# Retrieval
retrieval-no-results = 知识库中没有找到相关内容。
retrieval-error = 查询出错：{ $reason }
retrieval-file-header = 【来源文件：{ $file }】
retrieval-sources = 【参考来源文件】：{ $files }

# Multimodal
multimodal-image-caption = 图片 { $url }：

# Knowledge base
kb-upload-success = 入库成功
kb-upload-unchanged = 文件内容未变化，跳过重新入库
kb-delete-success = { $name } 已删除
kb-solve-success = 解答已提交并入库
kb-solution-question = 问题：{ $query }
kb-solution-answer = 解答：{ $answer }

# Errors
error-file-not-found = 知识库中不存在文件：{ $name }
error-question-not-found = 待解答列表中没有该问题：{ $query }
error-unsupported-format = 不支持的文件格式：{ $format }
error-voice-not-configured = 语音识别服务未配置
error-internal = 服务内部错误

# Health
health-status-healthy = 服务运行正常
health-status-degraded = 服务降级：{ $reason }
"#;

const EN: &str = r#"
# Agent turn
agent-escalation-apology = Sorry, the knowledge base does not contain material that answers this question yet. I have added it to the unanswered questions list so a technician can follow up. If you can, please share the exact error code or symptom.
agent-model-failure = Sorry, the assistant cannot reach the model service right now. Please try again later. ({ $reason })
agent-step-limit = Sorry, this question needed too many steps and the turn was stopped. It has been recorded for follow-up.
agent-escalation-recorded = Recorded unanswered question: { $query }
agent-escalation-duplicate = Question is already pending review: { $query }
agent-escalation-failed = Failed to record unanswered question: { $reason }
agent-forced-escalation-reason = Knowledge base results were not sufficient to answer the question
agent-step-limit-reason = Model call limit reached before an answer was found
agent-tool-args-invalid = Invalid tool arguments: { $reason }
agent-empty-response = Sorry, no answer was produced this time. Please rephrase your question.

# Retrieval
retrieval-no-results = No relevant content was found in the knowledge base.
retrieval-error = Query failed: { $reason }
retrieval-file-header = [Source file: { $file }]
retrieval-sources = [Reference files]: { $files }

# Multimodal
multimodal-image-caption = Image { $url }:

# Knowledge base
kb-upload-success = Ingested successfully
kb-upload-unchanged = File content unchanged, skipped re-ingestion
kb-delete-success = { $name } deleted
kb-solve-success = Answer submitted and ingested
kb-solution-question = Question: { $query }
kb-solution-answer = Answer: { $answer }

# Errors
error-file-not-found = File not found in knowledge base: { $name }
error-question-not-found = No pending question matches: { $query }
error-unsupported-format = Unsupported file format: { $format }
error-voice-not-configured = Voice transcription is not configured
error-internal = An internal error occurred

# Health
health-status-healthy = Service is healthy
health-status-degraded = Service is degraded: { $reason }
"#;

/// Internationalization service using Fluent (thread-safe)
pub struct I18n {
    bundles: RwLock<HashMap<String, FluentBundle<FluentResource>>>,
    default_locale: String,
}

impl I18n {
    /// Create an i18n service with the embedded `zh-CN` and `en` messages.
    ///
    /// `default_locale` is the fallback for lookups in locales that are not loaded.
    pub fn new(default_locale: &str) -> Self {
        let i18n = Self {
            bundles: RwLock::new(HashMap::new()),
            default_locale: default_locale.to_string(),
        };

        for (locale, content) in [("zh-CN", ZH_CN), ("en", EN)] {
            if let Err(e) = i18n.add_locale(locale, content) {
                warn!(locale, error = %e, "Failed to load embedded translations");
            }
        }

        i18n
    }

    /// Add a locale with translations
    pub fn add_locale(&self, locale: &str, content: &str) -> Result<(), String> {
        let lang_id: LanguageIdentifier = locale
            .parse()
            .map_err(|e| format!("Invalid locale '{}': {}", locale, e))?;

        let resource = FluentResource::try_new(content.to_string())
            .map_err(|(_, errors)| format!("Failed to parse Fluent resource: {:?}", errors))?;

        let mut bundle = FluentBundle::new_concurrent(vec![lang_id]);
        // Messages end up in model prompts and file names, so no bidi isolation marks
        bundle.set_use_isolating(false);
        bundle
            .add_resource(resource)
            .map_err(|errors| format!("Failed to add resource to bundle: {:?}", errors))?;

        let mut bundles = self
            .bundles
            .write()
            .map_err(|_| "translation bundles lock poisoned".to_string())?;
        bundles.insert(locale.to_string(), bundle);

        debug!(locale = %locale, "Loaded translations");

        Ok(())
    }

    /// Get a translated message
    pub fn get(&self, locale: &str, key: &str, args: Option<&FluentArgs>) -> String {
        // Try requested locale, fall back to default, fall back to key
        self.try_get(locale, key, args)
            .or_else(|| self.try_get(&self.default_locale, key, args))
            .unwrap_or_else(|| key.to_string())
    }

    /// Try to get a translation from a specific locale
    fn try_get(&self, locale: &str, key: &str, args: Option<&FluentArgs>) -> Option<String> {
        let bundles = self.bundles.read().ok()?;
        let bundle = bundles.get(locale)?;
        let message = bundle.get_message(key)?;
        let pattern = message.value()?;

        let mut errors = vec![];
        let result = bundle.format_pattern(pattern, args, &mut errors);

        if !errors.is_empty() {
            warn!(key = %key, errors = ?errors, "Fluent formatting errors");
        }

        Some(result.to_string())
    }

    /// Get a translated message with arguments
    pub fn format(&self, locale: &str, key: &str, args: &[(&str, &str)]) -> String {
        let mut fluent_args = FluentArgs::new();
        for (k, v) in args {
            fluent_args.set(*k, *v);
        }
        self.get(locale, key, Some(&fluent_args))
    }
}

impl Default for I18n {
    fn default() -> Self {
        Self::new("zh-CN")
    }
}
