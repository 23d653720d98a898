use state_machines::state_machine;

state_machine! {
    name: ItemMachine,
    state: ItemState,
    initial: Ready,
    states: [
        Ready,
        BlueprintChosen,
        ProviderChosen,
        PrintAreaChosen,
        ImageReady,
        ImageUploaded,
        ContentReady,
        ProductCreated,
        Settled
    ],
    events {
        choose_blueprint { transition: { from: Ready, to: BlueprintChosen } }
        choose_provider { transition: { from: BlueprintChosen, to: ProviderChosen } }
        choose_print_area { transition: { from: ProviderChosen, to: PrintAreaChosen } }
        prepare_image { transition: { from: PrintAreaChosen, to: ImageReady } }
        upload_image { transition: { from: ImageReady, to: ImageUploaded } }
        write_content { transition: { from: ImageUploaded, to: ContentReady } }
        create_product { transition: { from: ContentReady, to: ProductCreated } }
        settle { transition: { from: ProductCreated, to: Settled } }
    }
}

pub fn ready() -> ItemMachine<(), Ready> {
    ItemMachine::new(())
}
