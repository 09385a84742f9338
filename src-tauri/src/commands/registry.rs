/// Single source of truth for all commands
/// This macro takes a wrapper macro path and applies it to the command list
#[macro_export]
macro_rules! with_commands {
    ($($wrapper:tt)*) => {
        $($wrapper)*![
            // App
            $crate::commands::get_app_version,
            $crate::commands::load_app_config,
            $crate::commands::save_app_config,
            // Models
            $crate::commands::get_available_models,
            $crate::commands::select_model,
            $crate::commands::load_selected_model,
            $crate::commands::unload_model,
            $crate::commands::get_session_status,
            // Chat
            $crate::commands::send_message,
            $crate::commands::submit_input,
            $crate::commands::set_chat_input,
            $crate::commands::get_chat_input,
            $crate::commands::get_transcript,
            $crate::commands::clear_transcript,
            // Prompts
            $crate::commands::get_prompts,
            $crate::commands::get_selected_prompt,
            $crate::commands::select_prompt,
            $crate::commands::clear_prompt,
            $crate::commands::update_prompt,
            $crate::commands::preview_prompt,
            // Speech
            $crate::commands::start_speech_capture,
            $crate::commands::stop_speech_capture,
            $crate::commands::is_speech_capturing,
            $crate::commands::load_speech_config,
            $crate::commands::save_speech_config,
            $crate::commands::delete_speech_key,
        ]
    };
}
