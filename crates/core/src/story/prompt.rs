use crate::story::{AgeGroup, StoryRequest};

fn guidelines(age_group: AgeGroup) -> &'static str {
    match age_group {
        AgeGroup::Toddler => {
            "- Use very simple words (1-2 syllables)\n\
             - Short sentences (5-7 words max)\n\
             - Lots of repetition and rhythm\n\
             - Focus on familiar objects, animals, and daily routines\n\
             - Story length: 200-300 words\n\
             - Include onomatopoeia and sound words"
        }
        AgeGroup::Preschool => {
            "- Simple vocabulary with some new words\n\
             - Sentences of 8-12 words\n\
             - Clear cause and effect\n\
             - Include fantasy elements, talking animals, simple adventures\n\
             - Story length: 400-600 words\n\
             - Gentle conflict with happy resolution"
        }
        AgeGroup::EarlyReader => {
            "- Varied vocabulary with context clues for new words\n\
             - Mix of short and medium sentences\n\
             - Character development and emotions\n\
             - Can include mild suspense and humor\n\
             - Story length: 600-900 words\n\
             - Clear beginning, middle, and end"
        }
        AgeGroup::ChapterBook => {
            "- Rich vocabulary appropriate for 7-10 year olds\n\
             - Complex sentences with varied structure\n\
             - Multi-dimensional characters\n\
             - Can handle more complex emotions and themes\n\
             - Story length: 900-1200 words\n\
             - Can include subplots and twists"
        }
    }
}

fn naming_instruction(child_name: Option<&str>) -> String {
    match child_name {
        Some(name) => format!("The main character or a friend should be named \"{name}\"."),
        None => "Create a relatable main character with a friendly name.".to_owned(),
    }
}

pub fn system_prompt(request: &StoryRequest) -> String {
    format!(
        "You are a beloved children's story author known for creating magical, heartwarming \
         tales that captivate young minds. Your stories are filled with wonder, gentle lessons, \
         and characters children love.\n\
         \n\
         Guidelines for this age group ({label}):\n\
         {guidelines}\n\
         \n\
         Important rules:\n\
         - Create content that is 100% appropriate for children\n\
         - Include sensory details and vivid imagery\n\
         - End with a positive, satisfying conclusion\n\
         - Make it feel like a warm bedtime story\n\
         - {naming}\n\
         \n\
         Format your response as:\n\
         TITLE: [Your creative story title]\n\
         ---\n\
         [The full story text]",
        label = request.age_group.label(),
        guidelines = guidelines(request.age_group),
        naming = naming_instruction(request.child_name.as_deref()),
    )
}

pub fn user_prompt(request: &StoryRequest) -> String {
    format!(
        "Please write a children's story based on this idea: {}",
        request.prompt
    )
}
