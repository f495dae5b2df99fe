//! Diesel schema for task persistence.

diesel::table! {
    /// Asynchronous relay tasks.
    tasks (id) {
        /// Store-assigned identifier.
        id -> Int8,
        /// Upstream task identifier, empty for orphans.
        #[max_length = 191]
        task_id -> Varchar,
        /// Upstream platform.
        #[max_length = 30]
        platform -> Varchar,
        /// Action name.
        #[max_length = 40]
        action -> Varchar,
        /// Owning user.
        user_id -> Int8,
        /// Handling channel.
        channel_id -> Int8,
        /// Calling token.
        token_id -> Int8,
        /// Calling token key.
        #[max_length = 128]
        token_key -> Varchar,
        /// Lifecycle status.
        #[max_length = 20]
        status -> Varchar,
        /// Progress string.
        #[max_length = 20]
        progress -> Varchar,
        /// Submit time in unix seconds.
        submit_time -> Int8,
        /// Start time in unix seconds.
        start_time -> Int8,
        /// Finish time in unix seconds.
        finish_time -> Int8,
        /// Failure description.
        fail_reason -> Text,
        /// Charged quota.
        quota -> Int8,
        /// Upstream payload.
        data -> Jsonb,
        /// Adaptor metadata.
        properties -> Jsonb,
    }
}
